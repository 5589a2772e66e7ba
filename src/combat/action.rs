use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::SideId;

/// An intent submitted by one side for the current turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleAction {
    pub side_identity: String,
    #[serde(default = "now_ms")]
    pub submitted_at_ms: i64,
    #[serde(flatten)]
    pub kind: ActionKind,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl BattleAction {
    pub fn new(side_identity: impl Into<String>, kind: ActionKind) -> Self {
        BattleAction {
            side_identity: side_identity.into(),
            submitted_at_ms: now_ms(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ActionKind {
    Attack { move_id: u32 },
    Switch {
        from_index: usize,
        to_index: usize,
        #[serde(default)]
        is_forced: bool,
    },
    Item { item_id: String },
    Capture { ball_type: BallType },
    Run,
}

impl ActionKind {
    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::Attack { .. } => ActionType::Attack,
            ActionKind::Switch { .. } => ActionType::Switch,
            ActionKind::Item { .. } => ActionType::Item,
            ActionKind::Capture { .. } => ActionType::Capture,
            ActionKind::Run => ActionType::Run,
        }
    }

    /// Short human-readable form used in diagnostics
    pub fn summary(&self) -> String {
        match self {
            ActionKind::Attack { move_id } => format!("attack({})", move_id),
            ActionKind::Switch { from_index, to_index, is_forced } => {
                format!("switch({} -> {}{})", from_index, to_index, if *is_forced { ", forced" } else { "" })
            }
            ActionKind::Item { item_id } => format!("item({})", item_id),
            ActionKind::Capture { ball_type } => format!("capture({})", ball_type.item_id()),
            ActionKind::Run => "run".to_string(),
        }
    }
}

/// Payload-free action discriminant used by the phase legality table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Attack,
    Switch,
    Item,
    Capture,
    Run,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::Attack,
        ActionType::Switch,
        ActionType::Item,
        ActionType::Capture,
        ActionType::Run,
    ];

    pub fn category(self) -> ActionCategory {
        match self {
            ActionType::Switch | ActionType::Capture | ActionType::Run => ActionCategory::Tactical,
            ActionType::Item => ActionCategory::Item,
            ActionType::Attack => ActionCategory::Attack,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::Attack => "attack",
            ActionType::Switch => "switch",
            ActionType::Item => "item",
            ActionType::Capture => "capture",
            ActionType::Run => "run",
        };
        f.write_str(name)
    }
}

/// Category tier; higher ranks resolve first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Tactical, // switch, capture, run
    Item,
    Attack,
}

impl ActionCategory {
    pub fn rank(self) -> u8 {
        match self {
            ActionCategory::Tactical => 2,
            ActionCategory::Item => 1,
            ActionCategory::Attack => 0,
        }
    }
}

/// An action annotated for ordering
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueuedAction {
    pub side: SideId,
    pub action: BattleAction,
    pub category: ActionCategory,
    pub priority: i8, // Move priority tier, 0 for non-attacks
    pub speed: u32,   // Effective speed at submission time
}

impl QueuedAction {
    pub fn new(side: SideId, action: BattleAction, priority: i8, speed: u32) -> Self {
        let category = action.kind.action_type().category();
        let priority = if category == ActionCategory::Attack { priority } else { 0 };
        QueuedAction { side, action, category, priority, speed }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BallType {
    PokeBall,
    GreatBall,
    UltraBall,
    MasterBall,
}

impl BallType {
    /// Inventory key for this ball
    pub fn item_id(self) -> &'static str {
        match self {
            BallType::PokeBall => "poke_ball",
            BallType::GreatBall => "great_ball",
            BallType::UltraBall => "ultra_ball",
            BallType::MasterBall => "master_ball",
        }
    }
}
