//! The equip pipeline: strip, unequip/equip validation, the mutable
//! configuration stages, the single commit per item, and the post-commit
//! merge stages. Per-item failures are collected and reported in a batch;
//! only a broken blocking graph fails the call itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use eyre::Result;
use serde::Serialize;

use crate::club::crafting::{clamp_chars, CRAFT_DESCRIPTION_MAX, CRAFT_NAME_MAX};
use crate::club::model::{
    merge_type_record, validate_color, Asset, Character, Craft, Group, Item, TypeRecord,
};
use crate::club::wheel::events::{
    ActiveHooks, AfterItemEquip, AfterOutfitEquip, BeforeItemEquip, BeforeOutfitEquip, ColorEvent,
    ColorStage, CraftEvent, CraftOverride, CraftStage, DifficultyEvent, DifficultyStage,
    Disposition, EquipCheckEvent, EquipLog, HookMeta, HookRegistry, ItemConfig, ItemConfigEvent,
    ItemDoneEvent, OutfitEvent, PropertyEvent, PropertyStage, Stage, TypeRecordEvent,
    TypeRecordStage, UnequipEvent, ValidateEquip, ValidateUnequip,
};
use crate::club::wheel::graph::{block_superset, SortItem};
use crate::club::wheel::locks::{apply_flag, blocked_by_enclose, can_unlock, LockFlag};
use crate::club::wheel::{level_permits, StripLevel, WheelItem};
use crate::host::Host;

/// Everything one batch needs: what to equip, how much to strip first,
/// which optional hooks run, and an optional lock directive.
#[derive(Clone, Debug)]
pub struct EquipRequest {
    /// Name of the outfit, used for logging and the batch events.
    pub name: String,
    pub items: Vec<WheelItem>,
    pub strip_level: StripLevel,
    pub active_hooks: ActiveHooks,
    pub lock_flag: Option<LockFlag>,
}

impl EquipRequest {
    pub fn new(name: impl Into<String>, items: Vec<WheelItem>) -> EquipRequest {
        EquipRequest {
            name: name.into(),
            items,
            strip_level: StripLevel::default(),
            active_hooks: ActiveHooks::new(),
            lock_flag: None,
        }
    }
}

/// What a batch did. Partial success is the normal completion mode: the
/// batch never fails because individual items did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EquipReport {
    /// `Group/Name` keys of the items that were committed.
    pub equipped: Vec<String>,
    /// Failure reasons per `Group/Name` key.
    pub failures: BTreeMap<String, Vec<String>>,
    /// True when the batch aborted before any mutation.
    pub aborted: bool,
    pub log: EquipLog,
}

/// Remove every appearance item the strip level covers. Restraints and
/// non-removable body groups are never touched.
pub fn strip_character(level: StripLevel, character: &mut Character) {
    let mut index = character.appearance.len();
    while index > 0 {
        index -= 1;
        let asset = character.appearance[index].asset.clone();
        if asset.group.allow_none
            && asset.group.is_appearance()
            && level_permits(level, character, &asset)
        {
            character.appearance.remove(index);
        }
    }
}

/// A first-pass entry: either a worn blocker that must come off, or an
/// incoming item whose group must be vacated.
struct UnequipEntry {
    key: String,
    group: Arc<Group>,
    new_asset: Option<Arc<Asset>>,
}

fn failure_key(group: &str, name: &str) -> String {
    format!("{group}/{name}")
}

/// Run the full equip pipeline for `request` against `character`.
///
/// Stages run in a fixed order; listeners run in registration order within
/// each stage. The character is refreshed exactly once at the end, and the
/// appearance is pushed to the room only for the player.
pub fn equip_outfit(
    host: &dyn Host,
    registry: &HookRegistry,
    character: &mut Character,
    request: &EquipRequest,
) -> Result<EquipReport> {
    let mut log = EquipLog::default();
    let mut failures: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut equipped: Vec<String> = Vec::new();
    let active = &request.active_hooks;

    // A character enclosed behind an unremovable lock is never touched.
    if blocked_by_enclose(host, character) {
        log::warn!(
            "Failed to equip the {:?} wheel outfit: cannot unlock the enclosing item",
            request.name
        );
        log.batch(
            BeforeOutfitEquip::NAME,
            Disposition::Rejected("cannot unlock the enclosing item".into()),
        );
        return Ok(EquipReport {
            aborted: true,
            log,
            ..EquipReport::default()
        });
    }

    {
        let chr: &Character = character;
        let mut event = OutfitEvent {
            outfit: &request.name,
            character: chr,
        };
        registry.run::<BeforeOutfitEquip>(&mut event, active, &mut log);
    }

    strip_character(request.strip_level, character);

    // Resolve the targets up front. Unknown assets become per-item failures
    // instead of poisoning the blocking graph.
    let mut targets: Vec<(&WheelItem, Arc<Asset>)> = Vec::new();
    for item in &request.items {
        let key = failure_key(&item.group, &item.name);
        match host.asset(&character.asset_family, &item.group, &item.name) {
            Some(asset) => targets.push((item, asset)),
            None => {
                log.note(
                    ValidateUnequip::NAME,
                    &key,
                    Disposition::Failed("Unknown asset".into()),
                );
                failures.insert(key, vec!["Unknown asset".into()]);
            }
        }
    }

    // Worn items that block the incoming set have to come off first.
    let target_refs: Vec<SortItem> = targets.iter().map(|(item, _)| SortItem::from(*item)).collect();
    let blocking: Vec<Item> = {
        let worn = &character.appearance;
        block_superset(host, character, &target_refs, worn)?
            .into_iter()
            .cloned()
            .collect()
    };

    // First pass: validate every group about to be vacated or overwritten,
    // and remove the current occupants.
    let entries: Vec<UnequipEntry> = blocking
        .iter()
        .map(|item| UnequipEntry {
            key: failure_key(item.group_name(), &item.asset.name),
            group: item.asset.group.clone(),
            new_asset: None,
        })
        .chain(targets.iter().map(|(item, asset)| UnequipEntry {
            key: failure_key(&item.group, &item.name),
            group: asset.group.clone(),
            new_asset: Some(asset.clone()),
        }))
        .collect();

    let mut old_items: BTreeMap<String, Item> = BTreeMap::new();
    for entry in &entries {
        let old_item = character.item_by_group(&entry.group.name).cloned();
        let reasons: Vec<String> = {
            let chr: &Character = character;
            let mut event = UnequipEvent {
                outfit: &request.name,
                character: chr,
                group: &entry.group,
                old_item: old_item.as_ref(),
                new_asset: entry.new_asset.as_ref(),
            };
            registry
                .run::<ValidateUnequip>(&mut event, active, &mut log)
                .into_iter()
                .flatten()
                .collect()
        };
        if !reasons.is_empty() {
            log.note(
                ValidateUnequip::NAME,
                &entry.key,
                Disposition::Rejected(reasons.join("; ")),
            );
            failures.insert(entry.key.clone(), reasons);
            continue;
        }

        if let Some(old_item) = old_item {
            host.remove_item(character, &entry.group.name);
            old_items.insert(entry.group.name.clone(), old_item);
        }
    }

    // Second pass: equip the incoming items.
    for (wheel, asset) in &targets {
        let key = failure_key(&wheel.group, &wheel.name);
        if failures.contains_key(&key) {
            continue;
        }
        let old_item = old_items.get(&asset.group.name).cloned();

        let reasons: Vec<String> = {
            let chr: &Character = character;
            let mut event = EquipCheckEvent {
                outfit: &request.name,
                character: chr,
                old_item: old_item.as_ref(),
                new_asset: asset,
            };
            registry
                .run::<ValidateEquip>(&mut event, active, &mut log)
                .into_iter()
                .flatten()
                .collect()
        };
        if !reasons.is_empty() {
            log.note(
                ValidateEquip::NAME,
                &key,
                Disposition::Rejected(reasons.join("; ")),
            );
            failures.insert(key, reasons);
            continue;
        }

        // Mutable configuration, seeded from the wheel item itself.
        let seed = ItemConfig {
            color: Some(validate_color(asset, wheel.color.as_ref())),
            craft: wheel.craft.as_ref().map(|craft| CraftOverride {
                name: Some(craft.name.clone()),
                description: Some(craft.description.clone()),
                property: Some(craft.property),
            }),
            type_record: wheel.type_record.clone(),
            properties: wheel.property.clone(),
            difficulty_modifier: 0,
        };
        let config = {
            let chr: &Character = character;
            let mut event = ItemConfigEvent::new(
                &request.name,
                chr,
                old_item.as_ref(),
                asset,
                request.lock_flag,
                seed,
            );
            let errors: Vec<String> = registry
                .run::<BeforeItemEquip>(&mut event, active, &mut log)
                .into_iter()
                .filter_map(|output| output.err())
                .map(|error| error.to_string())
                .collect();
            if !errors.is_empty() {
                log.note(
                    BeforeItemEquip::NAME,
                    &key,
                    Disposition::Failed(errors.join("; ")),
                );
                failures.insert(key, errors);
                continue;
            }
            event.into_config()
        };

        // Color proposals merge index-wise onto the pending color; later
        // proposals win, and excess layers are dropped.
        let mut color = config
            .color
            .unwrap_or_else(|| validate_color(asset, None));
        let proposals = {
            let chr: &Character = character;
            let mut event = ColorEvent {
                outfit: &request.name,
                character: chr,
                old_item: old_item.as_ref(),
                new_asset: asset,
                color: &color,
            };
            registry.run::<ColorStage>(&mut event, active, &mut log)
        };
        for proposal in proposals.into_iter().flatten() {
            for (index, slot) in proposal.into_iter().take(color.len()).enumerate() {
                if let Some(value) = slot {
                    color[index] = value;
                }
            }
        }

        // The single commit point for this item.
        let skill = host.bondage_skill(character);
        let index = host.create_item(character, asset, color, skill);

        // Merge keyed type values into the new item's record.
        let mut record = config.type_record;
        let merges = {
            let chr: &Character = character;
            let mut event = TypeRecordEvent {
                outfit: &request.name,
                character: chr,
                new_asset: asset,
                record: wheel.type_record.as_ref(),
            };
            registry.run::<TypeRecordStage>(&mut event, active, &mut log)
        };
        for merge in merges.into_iter().flatten() {
            merge_type_record(record.get_or_insert_with(TypeRecord::new), &merge);
        }

        // Merge defined property fields the same way.
        let mut properties = config.properties.unwrap_or_default();
        let overlays = {
            let chr: &Character = character;
            let mut event = PropertyEvent {
                outfit: &request.name,
                character: chr,
                new_asset: asset,
                properties: &properties,
            };
            registry.run::<PropertyStage>(&mut event, active, &mut log)
        };
        for overlay in overlays.into_iter().flatten() {
            properties.merge_defined(&overlay);
        }

        // Apply the record first so the merged properties overlay the
        // extended baseline rather than being clobbered by it.
        if let Some(record) = &record {
            if let Err(error) = host.apply_type_record(character, index, record) {
                log.note(
                    TypeRecordStage::NAME,
                    &key,
                    Disposition::Failed(error.to_string()),
                );
                // The item stays worn, untyped; it is a failure, not a
                // success, so the rest of its pipeline is skipped.
                failures
                    .entry(key.clone())
                    .or_default()
                    .push(error.to_string());
                continue;
            }
        }
        if !properties.is_empty() {
            if let Some(item) = character.appearance.get_mut(index) {
                item.property.merge_defined(&properties);
            }
        }

        // Craft hooks only fire for craft-eligible assets; a hook output on
        // an uncrafted item synthesizes the skeleton first.
        if asset.craftable() {
            let mut craft: Option<Craft> = wheel.craft.clone();
            if let Some(seeded) = &config.craft {
                seeded.apply_to(craft.get_or_insert_with(|| Craft::skeleton(asset)));
            }
            let overrides = {
                let chr: &Character = character;
                let mut event = CraftEvent {
                    outfit: &request.name,
                    character: chr,
                    new_asset: asset,
                    craft: craft.as_ref(),
                };
                registry.run::<CraftStage>(&mut event, active, &mut log)
            };
            for output in overrides.into_iter().flatten() {
                output.apply_to(craft.get_or_insert_with(|| Craft::skeleton(asset)));
            }
            if let Some(mut craft) = craft {
                craft.name = clamp_chars(&craft.name, CRAFT_NAME_MAX);
                craft.description = clamp_chars(&craft.description, CRAFT_DESCRIPTION_MAX);
                if let Some(item) = character.appearance.get_mut(index) {
                    item.craft = Some(craft);
                }
                host.apply_craft(character, index);
            }
        }

        // Difficulty modifiers are summed, never averaged or clamped.
        let hook_sum: i32 = {
            let chr: &Character = character;
            let mut event = DifficultyEvent {
                outfit: &request.name,
                character: chr,
                new_asset: asset,
                difficulty_modifier: config.difficulty_modifier,
            };
            registry
                .run::<DifficultyStage>(&mut event, active, &mut log)
                .into_iter()
                .sum()
        };
        if let Some(item) = character.appearance.get_mut(index) {
            item.difficulty += config.difficulty_modifier + hook_sum;
        }

        if let Some(flag) = request.lock_flag {
            apply_flag(host, character, index, flag);
        }

        {
            let chr: &Character = character;
            if let Some(item) = chr.appearance.get(index) {
                let mut event = ItemDoneEvent {
                    outfit: &request.name,
                    character: chr,
                    item,
                };
                registry.run::<AfterItemEquip>(&mut event, active, &mut log);
            }
        }
        equipped.push(key);
    }

    {
        let chr: &Character = character;
        let mut event = OutfitEvent {
            outfit: &request.name,
            character: chr,
        };
        registry.run::<AfterOutfitEquip>(&mut event, active, &mut log);
    }

    host.refresh(character);
    if character.is_player {
        host.push_appearance(character);
        if !failures.is_empty() {
            log::warn!(
                "Failed to equip {} {:?} wheel outfit item(s): {}",
                failures.len(),
                request.name,
                serde_json::to_string(&failures).unwrap_or_default()
            );
        }
        log::debug!(
            "Wheel outfit {:?} status: {}",
            request.name,
            serde_json::to_string(&log).unwrap_or_default()
        );
    }

    Ok(EquipReport {
        equipped,
        failures,
        aborted: false,
        log,
    })
}

/// Register the stock validators every session carries: the unequip checks
/// that keep the wheel from fighting the club's own rules, and the
/// prerequisite check for incoming items.
pub fn register_builtin_validators(registry: &mut HookRegistry, host: &Arc<dyn Host>) {
    let shared = Arc::clone(host);
    registry.register::<ValidateUnequip, _>(
        HookMeta::new(
            "carousel",
            "group-blocked",
            "Check whether the body area is blocked for the character.",
        ),
        move |event, _| {
            shared
                .group_blocked_for(event.character, &event.group.name)
                .then(|| "Body area is blocked".to_string())
        },
    );

    let shared = Arc::clone(host);
    registry.register::<ValidateUnequip, _>(
        HookMeta::new(
            "carousel",
            "owner-rule",
            "Check whether the body area is blocked by an owner rule.",
        ),
        move |event, _| {
            shared
                .group_blocked_by_owner(event.character, &event.group.name)
                .then(|| "Body area is blocked by an owner rule".to_string())
        },
    );

    let shared = Arc::clone(host);
    registry.register::<ValidateUnequip, _>(
        HookMeta::new(
            "carousel",
            "locked-item",
            "Check whether the character can unlock the currently equipped item.",
        ),
        move |event, _| match event.old_item {
            Some(item) if !can_unlock(shared.as_ref(), event.character, item) => {
                Some("Locked item equipped".to_string())
            }
            _ => None,
        },
    );

    let shared = Arc::clone(host);
    registry.register::<ValidateUnequip, _>(
        HookMeta::new(
            "carousel",
            "blocked-or-limited",
            "Check whether the new item is blocked or limited.",
        ),
        move |event, _| match event.new_asset {
            Some(asset) if shared.blocked_or_limited(event.character, asset) => {
                Some("New item is blocked or limited".to_string())
            }
            _ => None,
        },
    );

    let shared = Arc::clone(host);
    registry.register::<ValidateUnequip, _>(
        HookMeta::new(
            "carousel",
            "room-category",
            "Check whether the room blocks the new item's category.",
        ),
        move |event, _| match event.new_asset {
            Some(asset) if !shared.room_allows(&asset.categories) => {
                Some("Room blocks the item's category".to_string())
            }
            _ => None,
        },
    );

    let shared = Arc::clone(host);
    registry.register::<ValidateUnequip, _>(
        HookMeta::new(
            "carousel",
            "club-slave",
            "Check whether the new item is blocked by club slave status.",
        ),
        move |event, _| match event.new_asset {
            Some(asset)
                if asset.group.is_appearance()
                    && event.character.is_player
                    && shared.is_club_slave(event.character) =>
            {
                Some("Blocked via Club Slave Collar".to_string())
            }
            _ => None,
        },
    );

    let shared = Arc::clone(host);
    registry.register::<ValidateEquip, _>(
        HookMeta::new(
            "carousel",
            "prerequisite",
            "Check whether the new item's prerequisites can be satisfied.",
        ),
        move |event, _| {
            shared
                .unmet_prerequisite(event.character, event.new_asset)
                .map(|unmet| format!("Missing prerequisite: {unmet}"))
        },
    );
}
