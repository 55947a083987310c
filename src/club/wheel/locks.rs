//! Lock flags a wheel option can spin with, their application to a freshly
//! equipped item, and the unlock table deciding whether a character can get
//! a locked item off again.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::club::model::{Character, CraftProperty, Item, ENCLOSE, LOCK};
use crate::host::Host;

/// Longest timer the wheel will set.
pub const TIMER_MAX_MINUTES: u32 = 240;

/// A lock directive attached to a whole equip batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LockFlag {
    Timer { minutes: u32 },
    Exclusive,
    HighSecurity,
}

impl LockFlag {
    /// The roster every new item set starts from.
    pub const CANONICAL: [LockFlag; 6] = [
        LockFlag::Timer { minutes: 5 },
        LockFlag::Timer { minutes: 15 },
        LockFlag::Timer { minutes: 60 },
        LockFlag::Timer { minutes: 240 },
        LockFlag::Exclusive,
        LockFlag::HighSecurity,
    ];

    /// The padlock asset this flag attaches.
    pub fn lock_name(self) -> &'static str {
        match self {
            LockFlag::Timer { .. } => "TimerPasswordPadlock",
            LockFlag::Exclusive => "ExclusivePadlock",
            LockFlag::HighSecurity => "HighSecurityPadlock",
        }
    }

    /// Label shown in wheel option descriptions.
    pub fn label(self) -> String {
        match self {
            LockFlag::Timer { minutes } if minutes % 60 == 0 && minutes > 0 => {
                match minutes / 60 {
                    1 => "1 Hour".into(),
                    hours => format!("{hours} Hours"),
                }
            }
            LockFlag::Timer { minutes: 1 } => "1 Minute".into(),
            LockFlag::Timer { minutes } => format!("{minutes} Minutes"),
            LockFlag::Exclusive => "Exclusive".into(),
            LockFlag::HighSecurity => "High Security".into(),
        }
    }
}

/// An uppercase A-Z password of the given length.
pub fn random_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| rng.gen_range(b'A'..=b'Z') as char)
        .collect()
}

/// Attach the flag's padlock to the item at `index` and fill in the lock's
/// bookkeeping. An unknown lock asset or a lock-refusing item is skipped
/// with a warning; the item itself stays equipped either way.
pub fn apply_flag(host: &dyn Host, character: &mut Character, index: usize, flag: LockFlag) {
    let Some(item) = character.appearance.get(index) else {
        return;
    };
    if !item.asset.allow_lock {
        log::debug!("Asset {:?} does not accept locks", item.asset.name);
        return;
    }

    let family = character.asset_family.clone();
    let Some(lock) = host.asset(&family, "ItemMisc", flag.lock_name()) else {
        log::warn!("Cannot attach unknown lock asset {:?}", flag.lock_name());
        return;
    };
    host.attach_lock(character, index, &lock);

    let Some(item) = character.appearance.get_mut(index) else {
        return;
    };
    match flag {
        LockFlag::Timer { minutes } => {
            let minutes = minutes.min(TIMER_MAX_MINUTES);
            item.property.remove_timer = Some(host.now_ms() + i64::from(minutes) * 60_000);
            item.property.remove_item = Some(true);
            item.property.lock_set = Some(true);
            item.property.password = Some(random_password(8));
        }
        LockFlag::Exclusive => {}
        LockFlag::HighSecurity => {
            // Nobody gets a key.
            item.property.member_number_list_keys = Some(Vec::new());
        }
    }
}

/// Whether the character can get the lock off the given item.
pub fn can_unlock(host: &dyn Host, character: &Character, item: &Item) -> bool {
    if !item.has_effect(LOCK) {
        return true;
    }
    let lock = item
        .lock_name()
        .and_then(|name| host.asset(&character.asset_family, "ItemMisc", name));

    let decoy = item
        .craft
        .as_ref()
        .map_or(false, |craft| craft.property == CraftProperty::Decoy);
    if decoy {
        // Owner-/lover-exclusive items stay locked even on decoy restraints.
        let Some(lock) = &lock else {
            return false;
        };
        return !(lock.owner_only
            || lock.lover_only
            || lock.family_only
            || item.asset.owner_only
            || item.asset.lover_only
            || item.asset.family_only);
    }

    let block_keyuse = character.is_player && host.keyuse_blocked_by_rule(character);
    match lock.as_ref().map(|lock| lock.name.as_str()) {
        Some("SafewordPadlock") => true,
        Some(
            name @ ("MetalPadlock" | "MistressPadlock" | "MistressTimerPadlock" | "PandoraPadlock"),
        ) => {
            if block_keyuse || host.keys_deposited(character) {
                return false;
            }
            let key = format!("{name}Key");
            character.inventory.iter().any(|(_, item)| item == &key)
        }
        Some("TimerPasswordPadlock" | "PasswordPadlock" | "CombinationPadlock") => {
            item.property.lock_member_number == Some(character.member_number)
        }
        Some("HighSecurityPadlock") => {
            !block_keyuse
                && item
                    .property
                    .member_number_list_keys
                    .as_ref()
                    .map_or(false, |keys| keys.contains(&character.member_number))
        }
        _ => false,
    }
}

/// Whether the character is enclosed by an item whose lock `can_unlock`
/// says cannot come off. Such a character must not be touched at all.
pub fn blocked_by_enclose(host: &dyn Host, character: &Character) -> bool {
    character
        .appearance
        .iter()
        .find(|item| item.has_effect(ENCLOSE))
        .map_or(false, |item| !can_unlock(host, character, item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::model::Craft;
    use crate::host::LocalHost;

    fn equip(host: &LocalHost, character: &mut Character, group: &str, name: &str) -> usize {
        let asset = host
            .asset(&character.asset_family, group, name)
            .unwrap_or_else(|| panic!("fixture asset {group}/{name}"));
        host.create_item(character, &asset, vec![], 0)
    }

    fn lock_with(host: &LocalHost, character: &mut Character, index: usize, lock_name: &str) {
        let lock = host
            .asset(&character.asset_family, "ItemMisc", lock_name)
            .unwrap();
        host.attach_lock(character, index, &lock);
    }

    #[test]
    fn test_unlocked_items_always_come_off() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        assert!(can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_safeword_padlock_always_opens() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        lock_with(&host, &mut character, index, "SafewordPadlock");
        assert!(can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_metal_padlock_needs_the_key() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        lock_with(&host, &mut character, index, "MetalPadlock");

        character.inventory.clear();
        assert!(!can_unlock(&host, &character, &character.appearance[index]));

        character
            .inventory
            .push(("ItemMisc".into(), "MetalPadlockKey".into()));
        assert!(can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_deposited_keys_are_out_of_reach() {
        let mut host = LocalHost::standard();
        host.set_keys_deposited(true);
        let mut character = host.character("Tess", 1234);
        character
            .inventory
            .push(("ItemMisc".into(), "MetalPadlockKey".into()));
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        lock_with(&host, &mut character, index, "MetalPadlock");
        assert!(!can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_password_locks_open_for_their_setter() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        lock_with(&host, &mut character, index, "TimerPasswordPadlock");

        // attach_lock records the acting member as the lock setter.
        assert!(can_unlock(&host, &character, &character.appearance[index]));

        character.appearance[index].property.lock_member_number = Some(9999);
        assert!(!can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_high_security_checks_the_key_list() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        lock_with(&host, &mut character, index, "HighSecurityPadlock");

        character.appearance[index].property.member_number_list_keys = Some(vec![]);
        assert!(!can_unlock(&host, &character, &character.appearance[index]));

        character.appearance[index].property.member_number_list_keys =
            Some(vec![character.member_number]);
        assert!(can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_decoy_craft_opens_non_exclusive_locks() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        lock_with(&host, &mut character, index, "ExclusivePadlock");
        character.appearance[index].craft = Some(Craft {
            property: CraftProperty::Decoy,
            ..Craft::skeleton(&character.appearance[index].asset)
        });
        assert!(can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_unknown_locks_never_open() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        let item = &mut character.appearance[index];
        item.property.effects = Some(vec![LOCK.into()]);
        item.property.locked_by = Some("FimbriatedPadlock".into());
        assert!(!can_unlock(&host, &character, &character.appearance[index]));
    }

    #[test]
    fn test_timer_flag_fills_lock_bookkeeping() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        apply_flag(&host, &mut character, index, LockFlag::Timer { minutes: 15 });

        let item = &character.appearance[index];
        assert_eq!(item.lock_name(), Some("TimerPasswordPadlock"));
        assert_eq!(
            item.property.remove_timer,
            Some(host.now_ms() + 15 * 60_000)
        );
        assert_eq!(item.property.remove_item, Some(true));
        assert_eq!(item.property.lock_set, Some(true));
        let password = item.property.password.as_deref().unwrap();
        assert_eq!(password.len(), 8);
        assert!(password.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_oversized_timers_are_clamped() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        apply_flag(
            &host,
            &mut character,
            index,
            LockFlag::Timer { minutes: 90_000 },
        );
        let timer = character.appearance[index].property.remove_timer.unwrap();
        assert_eq!(
            timer,
            host.now_ms() + i64::from(TIMER_MAX_MINUTES) * 60_000
        );
    }

    #[test]
    fn test_high_security_flag_empties_the_key_list() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemArms", "Armbinder");
        apply_flag(&host, &mut character, index, LockFlag::HighSecurity);

        let item = &character.appearance[index];
        assert_eq!(item.lock_name(), Some("HighSecurityPadlock"));
        assert_eq!(item.property.member_number_list_keys, Some(vec![]));
    }

    #[test]
    fn test_lock_refusing_assets_are_skipped() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let index = equip(&host, &mut character, "ItemHandheld", "Bell");
        apply_flag(&host, &mut character, index, LockFlag::Exclusive);
        assert_eq!(character.appearance[index].lock_name(), None);
    }

    #[test]
    fn test_enclose_abort_predicate() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        assert!(!blocked_by_enclose(&host, &character));

        let index = equip(&host, &mut character, "ItemDevices", "FuturisticCrate");
        assert!(!blocked_by_enclose(&host, &character));

        lock_with(&host, &mut character, index, "ExclusivePadlock");
        assert!(blocked_by_enclose(&host, &character));
    }

    #[test]
    fn test_flag_labels() {
        assert_eq!(LockFlag::Timer { minutes: 5 }.label(), "5 Minutes");
        assert_eq!(LockFlag::Timer { minutes: 60 }.label(), "1 Hour");
        assert_eq!(LockFlag::Timer { minutes: 240 }.label(), "4 Hours");
        assert_eq!(LockFlag::Exclusive.label(), "Exclusive");
        assert_eq!(LockFlag::HighSecurity.label(), "High Security");
    }
}
