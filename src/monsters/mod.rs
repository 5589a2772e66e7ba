pub mod move_manager;
pub mod pokemon_type;

pub use move_manager::{MoveCategory, MoveData, MoveRepository, TypeChart};
pub use pokemon_type::PokemonType;
