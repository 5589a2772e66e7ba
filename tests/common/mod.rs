//! Shared builders and stub collaborators for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rand::rngs::SmallRng;

use battle_server::combat::effects::{MoveContext, MoveEffectResolver, MoveOutcome, ResolutionError};
use battle_server::combat::events::{BattleEvent, BattleEventEnvelope, EventSink, SinkError};
use battle_server::combat::hooks::{HookError, PersistenceHook, ProgressionHook, SaveRequest, SightingReport};
use battle_server::combat::state::{Combatant, CombatantMove, Controller, StatSet};
use battle_server::combat::{BattleEngine, BattleKind, BattleModules, BattlePhase, BattleSetup, Collaborators, SideId, SideSetup};
use battle_server::config::BattleTiming;
use battle_server::monsters::{MoveCategory, MoveData, PokemonType};

pub const TACKLE: u32 = 33;

pub fn move_data(id: u32, power: u32) -> MoveData {
    MoveData {
        id,
        name: format!("Move {}", id),
        accuracy: Some(100),
        power: Some(power),
        pp: 10,
        priority: 0,
        move_type: PokemonType::Normal,
        damage_class: MoveCategory::Physical,
        recoil_percent: None,
        secondary_effect: None,
        description: String::new(),
    }
}

/// Combatant whose single move `TACKLE` hits for `power` under [`PowerAsDamage`]
pub fn fighter(name: &str, hp: u32, speed: u32, power: u32) -> Combatant {
    Combatant {
        instance_id: format!("{}-id", name),
        species_id: 1,
        name: name.to_string(),
        level: 10,
        current_hp: hp,
        stats: StatSet { hp, attack: 20, defense: 20, special_attack: 20, special_defense: 20, speed },
        types: vec![PokemonType::Normal],
        moves: vec![CombatantMove::new(move_data(TACKLE, power))],
        status: None,
        is_shiny: false,
        catch_rate: 45,
        is_fainted: false,
    }
}

pub fn side(identity: &str, controller: Controller, team: Vec<Combatant>) -> SideSetup {
    SideSetup {
        identity: identity.to_string(),
        display_name: identity.to_uppercase(),
        controller,
        team,
        inventory: BTreeMap::new(),
    }
}

pub fn setup(kind: BattleKind, player1: SideSetup, player2: SideSetup) -> BattleSetup {
    BattleSetup {
        battle_id: None,
        kind,
        player1,
        player2,
        location: Some("route_1".to_string()),
        rng_seed: Some(7),
    }
}

/// Always hits; damage equals move power, recoil follows the move's percent
#[derive(Debug, Default)]
pub struct PowerAsDamage;

impl MoveEffectResolver for PowerAsDamage {
    fn name(&self) -> &'static str {
        "power_as_damage"
    }

    fn resolve(&self, ctx: &MoveContext<'_>, _rng: &mut SmallRng) -> Result<MoveOutcome, ResolutionError> {
        let damage = ctx.move_data.power.unwrap_or(0);
        let recoil = ctx.move_data.recoil_percent.map(|p| damage * p as u32 / 100).unwrap_or(0);
        Ok(MoveOutcome {
            hit: true,
            damage,
            effectiveness: 1.0,
            critical: false,
            recoil,
            inflicted_status: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct BrokenResolver;

impl MoveEffectResolver for BrokenResolver {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn resolve(&self, _ctx: &MoveContext<'_>, _rng: &mut SmallRng) -> Result<MoveOutcome, ResolutionError> {
        Err(ResolutionError::Other("effect table unavailable".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct FailingSink;

impl EventSink for FailingSink {
    fn deliver(&self, _envelope: &BattleEventEnvelope) -> Result<(), SinkError> {
        Err(SinkError::Delivery("renderer offline".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingHooks {
    pub saved: Mutex<Vec<SaveRequest>>,
    pub sightings: Mutex<Vec<SightingReport>>,
}

impl PersistenceHook for RecordingHooks {
    fn save_battle_result(&self, request: SaveRequest) -> Result<(), HookError> {
        self.saved.lock().unwrap().push(request);
        Ok(())
    }
}

impl ProgressionHook for RecordingHooks {
    fn combatant_sighted(&self, report: SightingReport) -> Result<(), HookError> {
        self.sightings.lock().unwrap().push(report);
        Ok(())
    }
}

pub fn modules(timing: &BattleTiming) -> BattleModules {
    let mut modules = BattleModules::standard(timing, None);
    modules.resolver = Arc::new(PowerAsDamage);
    modules
}

pub fn collaborators(hooks: &Arc<RecordingHooks>) -> Collaborators {
    Collaborators {
        persistence: hooks.clone(),
        progression: hooks.clone(),
        ..Collaborators::default()
    }
}

pub fn start(setup: BattleSetup) -> (BattleEngine, Arc<RecordingHooks>) {
    start_with(setup, BattleTiming::instant(), |_| {})
}

pub fn start_with(
    setup: BattleSetup,
    timing: BattleTiming,
    customize: impl FnOnce(&mut BattleModules),
) -> (BattleEngine, Arc<RecordingHooks>) {
    let hooks = Arc::new(RecordingHooks::default());
    let mut modules = modules(&timing);
    customize(&mut modules);
    let engine = BattleEngine::start(setup, modules, collaborators(&hooks), timing).expect("valid setup");
    (engine, hooks)
}

/// Fire due timers until `done` holds; panics if the battle stalls
pub fn drive_until(engine: &mut BattleEngine, done: impl Fn(&BattleEngine) -> bool) {
    for _ in 0..500 {
        if done(engine) {
            return;
        }
        let Some((id, _)) = engine.next_due_timer() else {
            panic!("battle stalled in {:?} with no timers", engine.phase());
        };
        engine.on_timer(id);
    }
    panic!("battle did not settle");
}

pub fn drive_to_selection(engine: &mut BattleEngine) {
    drive_until(engine, |e| e.phase() == BattlePhase::ActionSelection || e.is_ended());
}

/// Fire timers until the turn counter moves past `turn` or the battle ends
pub fn drive_past_turn(engine: &mut BattleEngine, turn: u32) {
    drive_until(engine, |e| {
        e.is_ended() || (e.state().turn_number > turn && e.phase() == BattlePhase::ActionSelection)
    });
}

pub fn event_names(engine: &BattleEngine) -> Vec<&'static str> {
    engine.event_log().iter().map(|e| e.event.name()).collect()
}

/// Events emitted on or after the given sequence number
pub fn events_since(engine: &BattleEngine, sequence: u64) -> Vec<&BattleEventEnvelope> {
    engine.event_log().iter().filter(|e| e.sequence >= sequence).collect()
}

pub fn next_sequence(engine: &BattleEngine) -> u64 {
    engine.event_log().last().map(|e| e.sequence + 1).unwrap_or(0)
}

pub fn moves_used_by(events: &[&BattleEventEnvelope], side: SideId) -> usize {
    events
        .iter()
        .filter(|e| matches!(&e.event, BattleEvent::MoveUsed { side: s, .. } if *s == side))
        .count()
}
