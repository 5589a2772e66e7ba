use uuid::Uuid;

use crate::error::{BattleError, Result};
use crate::monsters::MoveRepository;

use super::engine::{BattleSetup, SideSetup};
use super::messages::{CombatantRequest, SideRequest, StartBattleRequest};
use super::state::{Combatant, CombatantMove};

/// Turn an HTTP start request into an engine setup, resolving move ids
pub fn build_battle_setup(request: StartBattleRequest, repository: &MoveRepository) -> Result<BattleSetup> {
    Ok(BattleSetup {
        battle_id: None,
        kind: request.kind,
        player1: convert_side(request.player1, repository)?,
        player2: convert_side(request.player2, repository)?,
        location: request.location,
        rng_seed: request.seed,
    })
}

fn convert_side(side: SideRequest, repository: &MoveRepository) -> Result<SideSetup> {
    let team = side
        .team
        .into_iter()
        .map(|combatant| convert_combatant(combatant, repository))
        .collect::<Result<Vec<_>>>()?;

    Ok(SideSetup {
        display_name: side.display_name.unwrap_or_else(|| side.identity.clone()),
        identity: side.identity,
        controller: side.controller,
        team,
        inventory: side.inventory,
    })
}

/// Convert a combatant snapshot to battle format
pub fn convert_combatant(request: CombatantRequest, repository: &MoveRepository) -> Result<Combatant> {
    let moves = request
        .moves
        .iter()
        .map(|move_id| {
            repository
                .get_move(*move_id)
                .cloned()
                .map(CombatantMove::new)
                .ok_or_else(|| BattleError::InvalidConfig(format!("{} knows unknown move {}", request.name, move_id)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Combatant {
        instance_id: request.instance_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        species_id: request.species_id,
        name: request.name,
        level: request.level,
        current_hp: request.current_hp.unwrap_or(request.stats.hp),
        stats: request.stats,
        types: request.types,
        moves,
        status: request.status,
        is_shiny: request.is_shiny,
        catch_rate: request.catch_rate.unwrap_or(45),
        is_fainted: false,
    })
}
