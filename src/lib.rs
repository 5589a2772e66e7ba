// Re-export modules for external use
pub mod app_state;
pub mod combat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod monsters;
pub mod redis_manager;
