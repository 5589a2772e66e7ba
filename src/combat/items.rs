use super::state::{Combatant, StatusCondition};

/// What a battle item does when used on the active combatant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEffect {
    Heal(u32),
    HealFull,
    Cure(&'static [StatusCondition]),
    Restore, // Full heal plus every status
}

const POISON: &[StatusCondition] = &[StatusCondition::Poison, StatusCondition::Toxic];
const SLEEP: &[StatusCondition] = &[StatusCondition::Sleep];
const PARALYSIS: &[StatusCondition] = &[StatusCondition::Paralysis];
const BURN: &[StatusCondition] = &[StatusCondition::Burn];
const FREEZE: &[StatusCondition] = &[StatusCondition::Freeze];
const ALL_STATUSES: &[StatusCondition] = &[
    StatusCondition::Burn,
    StatusCondition::Freeze,
    StatusCondition::Paralysis,
    StatusCondition::Poison,
    StatusCondition::Sleep,
    StatusCondition::Toxic,
];

pub fn item_effect(item_id: &str) -> Option<ItemEffect> {
    let effect = match item_id {
        "potion" => ItemEffect::Heal(20),
        "super_potion" => ItemEffect::Heal(60),
        "hyper_potion" => ItemEffect::Heal(120),
        "max_potion" => ItemEffect::HealFull,
        "full_restore" => ItemEffect::Restore,
        "antidote" => ItemEffect::Cure(POISON),
        "awakening" => ItemEffect::Cure(SLEEP),
        "paralyze_heal" => ItemEffect::Cure(PARALYSIS),
        "burn_heal" => ItemEffect::Cure(BURN),
        "ice_heal" => ItemEffect::Cure(FREEZE),
        "full_heal" => ItemEffect::Cure(ALL_STATUSES),
        _ => return None,
    };
    Some(effect)
}

/// Display name for an item id
pub fn item_name(item_id: &str) -> String {
    match item_id {
        "potion" => "Potion",
        "super_potion" => "Super Potion",
        "hyper_potion" => "Hyper Potion",
        "max_potion" => "Max Potion",
        "full_restore" => "Full Restore",
        "antidote" => "Antidote",
        "awakening" => "Awakening",
        "paralyze_heal" => "Paralyze Heal",
        "burn_heal" => "Burn Heal",
        "ice_heal" => "Ice Heal",
        "full_heal" => "Full Heal",
        "poke_ball" => "Poké Ball",
        "great_ball" => "Great Ball",
        "ultra_ball" => "Ultra Ball",
        "master_ball" => "Master Ball",
        other => other,
    }
    .to_string()
}

/// Apply an item to `target`; returns the status that was cleared, if any
pub fn apply_item(effect: ItemEffect, target: &mut Combatant) -> Option<StatusCondition> {
    let max_hp = target.max_hp();
    match effect {
        ItemEffect::Heal(amount) => {
            target.current_hp = target.current_hp.saturating_add(amount).min(max_hp);
            None
        }
        ItemEffect::HealFull => {
            target.current_hp = max_hp;
            None
        }
        ItemEffect::Cure(cures) => match target.status {
            Some(status) if cures.contains(&status) => target.status.take(),
            _ => None,
        },
        ItemEffect::Restore => {
            target.current_hp = max_hp;
            target.status.take()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::test_support::combatant;

    #[test]
    fn potion_heals_up_to_max() {
        let mut target = combatant("a", 15, 10);
        apply_item(ItemEffect::Heal(20), &mut target);
        assert_eq!(target.current_hp, 20);
    }

    #[test]
    fn cure_only_clears_matching_status() {
        let mut target = combatant("a", 15, 10);
        target.status = Some(StatusCondition::Burn);
        assert_eq!(apply_item(item_effect("antidote").unwrap(), &mut target), None);
        assert_eq!(target.status, Some(StatusCondition::Burn));
        assert_eq!(apply_item(item_effect("full_heal").unwrap(), &mut target), Some(StatusCondition::Burn));
        assert_eq!(target.status, None);
    }

    #[test]
    fn balls_are_not_usable_items() {
        assert!(item_effect("poke_ball").is_none());
        assert_eq!(item_name("great_ball"), "Great Ball");
    }
}
