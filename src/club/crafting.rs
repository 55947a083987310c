//! Crafting slot extension. The client caps crafted items per account; the
//! mod doubles that cap and round-trips the overflow through the settings
//! blob in the client's own wire format: fields joined by `¶`, records by
//! `§`, free-text fields sanitized of both.

use itertools::Itertools;

use crate::club::model::Craft;
use crate::host::Host;
use crate::meta::version::ClientVersion;

/// Crafting slots the client itself persists.
pub const CLIENT_SLOT_COUNT: usize = 80;
/// Slots available once the overflow cache is in play.
pub const SLOT_COUNT: usize = 160;

/// Character cap on craft names.
pub const CRAFT_NAME_MAX: usize = 30;
/// Character cap on craft descriptions. The client ships with 100; the mod
/// widens the input to match.
pub const CRAFT_DESCRIPTION_MAX: usize = 200;

const FIELD_SEP: char = '¶';
const RECORD_SEP: char = '§';

/// Truncate to at most `max` characters, never splitting a code point.
pub fn clamp_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn sanitize_field(value: &str) -> String {
    value.replace(FIELD_SEP, " ").replace(RECORD_SEP, " ")
}

/// Which wire shape the client expects for the trailing record fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CraftEncoding {
    /// Pre-R94: a bare layering override integer.
    Legacy,
    /// R94Beta1 and later: an empty ninth field plus a JSON property record.
    ItemProperty,
}

impl CraftEncoding {
    pub fn for_client(version: ClientVersion) -> CraftEncoding {
        let cutover = ClientVersion {
            release: 94,
            beta: Some(1),
        };
        if version >= cutover {
            CraftEncoding::ItemProperty
        } else {
            CraftEncoding::Legacy
        }
    }
}

fn serialize_record(craft: Option<&Craft>, encoding: CraftEncoding) -> String {
    let craft = match craft {
        Some(craft) if !craft.item.is_empty() => craft,
        _ => return String::new(),
    };
    let mut fields: Vec<String> = vec![
        craft.item.clone(),
        craft.property.to_string(),
        craft.lock.clone(),
        sanitize_field(&craft.name),
        sanitize_field(&craft.description),
        sanitize_field(&craft.color),
        if craft.private {
            "T".to_string()
        } else {
            String::new()
        },
        craft
            .item_type
            .as_deref()
            .map(sanitize_field)
            .unwrap_or_default(),
    ];
    match encoding {
        CraftEncoding::Legacy => fields.push(
            craft
                .override_priority
                .map(|p| p.to_string())
                .unwrap_or_default(),
        ),
        CraftEncoding::ItemProperty => {
            fields.push(String::new());
            fields.push(
                craft
                    .item_property
                    .as_ref()
                    .and_then(|p| serde_json::to_string(p).ok())
                    .unwrap_or_default(),
            );
        }
    }
    fields.join("¶")
}

/// Serialize a slot list. Empty slots become empty records so positions
/// survive the round trip.
pub fn serialize_crafts(crafts: &[Option<Craft>], encoding: CraftEncoding) -> String {
    crafts
        .iter()
        .map(|slot| serialize_record(slot.as_ref(), encoding))
        .join("§")
}

fn parse_record(record: &str, encoding: CraftEncoding) -> Option<Craft> {
    let fields: Vec<&str> = record.split(FIELD_SEP).collect();
    let field = |i: usize| fields.get(i).copied().unwrap_or("");
    if field(0).is_empty() {
        return None;
    }
    let mut craft = Craft {
        item: field(0).to_string(),
        property: field(1).parse().unwrap_or_default(),
        lock: field(2).to_string(),
        name: field(3).to_string(),
        description: field(4).to_string(),
        color: field(5).to_string(),
        private: field(6) == "T",
        item_type: (!field(7).is_empty()).then(|| field(7).to_string()),
        override_priority: None,
        item_property: None,
    };
    match encoding {
        CraftEncoding::Legacy => craft.override_priority = field(8).parse().ok(),
        CraftEncoding::ItemProperty => {
            craft.item_property = serde_json::from_str(field(9)).ok();
        }
    }
    Some(craft)
}

pub fn parse_crafts(blob: &str, encoding: CraftEncoding) -> Vec<Option<Craft>> {
    blob.split(RECORD_SEP)
        .map(|record| parse_record(record, encoding))
        .collect()
}

/// Outcome of validating one cached record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CraftStatus {
    Ok,
    /// Fixable problems were repaired in place.
    Repaired,
    /// The record is unusable and its slot must be emptied.
    Invalid,
}

/// Check one record against the live asset roster, repairing what can be
/// repaired.
pub fn validate_craft(host: &dyn Host, family: &str, craft: &mut Craft) -> CraftStatus {
    let asset = match host.asset_by_name(family, &craft.item) {
        Some(asset) => asset,
        None => return CraftStatus::Invalid,
    };

    let mut repaired = false;
    if craft.name.is_empty() {
        craft.name = asset.description.clone();
        repaired = true;
    }
    if craft.name.chars().count() > CRAFT_NAME_MAX {
        craft.name = clamp_chars(&craft.name, CRAFT_NAME_MAX);
        repaired = true;
    }
    if craft.description.chars().count() > CRAFT_DESCRIPTION_MAX {
        craft.description = clamp_chars(&craft.description, CRAFT_DESCRIPTION_MAX);
        repaired = true;
    }
    if !craft.lock.is_empty() {
        let lock_ok = host
            .asset(family, "ItemMisc", &craft.lock)
            .map(|lock| lock.is_lock)
            .unwrap_or(false);
        if !lock_ok {
            craft.lock.clear();
            repaired = true;
        }
    }

    if repaired {
        CraftStatus::Repaired
    } else {
        CraftStatus::Ok
    }
}

/// Merge the cached overflow back in above the client's own slots. Returns
/// true when any record needed repairing or dropping, in which case the
/// caller should re-save.
pub fn restore_overflow(
    host: &dyn Host,
    family: &str,
    slots: &mut Vec<Option<Craft>>,
    cache: &str,
    encoding: CraftEncoding,
) -> bool {
    // A slot list that already extends past the client cap has the overflow
    // merged in; touching it again would duplicate entries.
    if slots.len() > CLIENT_SLOT_COUNT || cache.is_empty() {
        return false;
    }
    slots.resize(CLIENT_SLOT_COUNT, None);

    let mut repaired = false;
    for slot in parse_crafts(cache, encoding) {
        if slots.len() >= SLOT_COUNT {
            log::warn!("Cached crafts exceed the slot cap; dropping the rest");
            break;
        }
        match slot {
            Some(mut craft) => match validate_craft(host, family, &mut craft) {
                CraftStatus::Ok => slots.push(Some(craft)),
                CraftStatus::Repaired => {
                    slots.push(Some(craft));
                    repaired = true;
                }
                CraftStatus::Invalid => {
                    log::warn!("Dropping unusable cached craft {:?}", craft.name);
                    slots.push(None);
                    repaired = true;
                }
            },
            None => slots.push(None),
        }
    }
    repaired
}

/// Serialize everything above the client's own slots for the settings blob.
pub fn overflow_cache(slots: &[Option<Craft>], encoding: CraftEncoding) -> String {
    match slots.get(CLIENT_SLOT_COUNT..) {
        Some(overflow) if !overflow.is_empty() => serialize_crafts(overflow, encoding),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::model::{CraftProperty, ItemProperties};
    use crate::host::LocalHost;

    #[test]
    fn test_item_property_encoding_round_trip() {
        let mut craft = Craft {
            item: "Armbinder".into(),
            name: "Midnight Binder".into(),
            description: "Tight behind the back".into(),
            lock: "MetalPadlock".into(),
            color: "#101010,#202020".into(),
            property: CraftProperty::Secure,
            private: true,
            ..Craft::default()
        };
        craft.item_property = Some(ItemProperties {
            override_priority: Some(31),
            ..ItemProperties::default()
        });

        let slots = vec![None, Some(craft.clone()), None];
        let blob = serialize_crafts(&slots, CraftEncoding::ItemProperty);
        let parsed = parse_crafts(&blob, CraftEncoding::ItemProperty);

        assert_eq!(parsed.len(), 3);
        assert!(parsed[0].is_none() && parsed[2].is_none());
        assert_eq!(parsed[1], Some(craft));
    }

    #[test]
    fn test_legacy_encoding_keeps_override_priority() {
        let craft = Craft {
            item: "Armbinder".into(),
            name: "Binder".into(),
            override_priority: Some(4),
            ..Craft::default()
        };

        let blob = serialize_crafts(&[Some(craft)], CraftEncoding::Legacy);
        let parsed = parse_crafts(&blob, CraftEncoding::Legacy);
        assert_eq!(parsed[0].as_ref().unwrap().override_priority, Some(4));
        assert!(parsed[0].as_ref().unwrap().item_property.is_none());
    }

    #[test]
    fn test_separators_are_sanitized() {
        let craft = Craft {
            item: "Armbinder".into(),
            name: "Bad¶Name".into(),
            description: "Bad§Description".into(),
            ..Craft::default()
        };

        let blob = serialize_crafts(&[Some(craft)], CraftEncoding::ItemProperty);
        let parsed = parse_crafts(&blob, CraftEncoding::ItemProperty);
        assert_eq!(parsed.len(), 1);
        let craft = parsed[0].as_ref().unwrap();
        assert_eq!(craft.name, "Bad Name");
        assert_eq!(craft.description, "Bad Description");
    }

    #[test]
    fn test_unknown_property_parses_to_normal() {
        let blob = "Armbinder¶Sparkly¶¶Binder¶¶¶¶¶¶";
        let parsed = parse_crafts(blob, CraftEncoding::ItemProperty);
        assert_eq!(parsed[0].as_ref().unwrap().property, CraftProperty::Normal);
    }

    #[test]
    fn test_encoding_cutover() {
        let parse = |s: &str| s.parse::<ClientVersion>().unwrap();
        assert_eq!(
            CraftEncoding::for_client(parse("R93")),
            CraftEncoding::Legacy
        );
        assert_eq!(
            CraftEncoding::for_client(parse("R94Beta1")),
            CraftEncoding::ItemProperty
        );
        assert_eq!(
            CraftEncoding::for_client(parse("R95")),
            CraftEncoding::ItemProperty
        );
    }

    #[test]
    fn test_validate_repairs_what_it_can() {
        let host = LocalHost::standard();

        let mut craft = Craft {
            item: "Armbinder".into(),
            name: String::new(),
            lock: "GhostPadlock".into(),
            description: "x".repeat(300),
            ..Craft::default()
        };
        assert_eq!(
            validate_craft(&host, "Female3DCG", &mut craft),
            CraftStatus::Repaired
        );
        assert!(!craft.name.is_empty());
        assert!(craft.lock.is_empty());
        assert_eq!(craft.description.chars().count(), CRAFT_DESCRIPTION_MAX);

        let mut craft = Craft {
            item: "NoSuchAsset".into(),
            ..Craft::default()
        };
        assert_eq!(
            validate_craft(&host, "Female3DCG", &mut craft),
            CraftStatus::Invalid
        );
    }

    #[test]
    fn test_restore_overflow_pads_and_merges() {
        let host = LocalHost::standard();
        let good = Craft {
            item: "Armbinder".into(),
            name: "Binder".into(),
            ..Craft::default()
        };
        let bad = Craft {
            item: "NoSuchAsset".into(),
            name: "Ghost".into(),
            ..Craft::default()
        };
        let cache = serialize_crafts(
            &[Some(good.clone()), Some(bad)],
            CraftEncoding::ItemProperty,
        );

        let mut slots = vec![Some(good.clone()), None];
        let repaired = restore_overflow(
            &host,
            "Female3DCG",
            &mut slots,
            &cache,
            CraftEncoding::ItemProperty,
        );

        assert!(repaired);
        assert_eq!(slots.len(), CLIENT_SLOT_COUNT + 2);
        assert_eq!(slots[CLIENT_SLOT_COUNT], Some(good));
        assert_eq!(slots[CLIENT_SLOT_COUNT + 1], None);
    }

    #[test]
    fn test_restore_overflow_skips_merged_lists() {
        let host = LocalHost::standard();
        let mut slots = vec![None; CLIENT_SLOT_COUNT + 1];
        let cache = serialize_crafts(
            &[Some(Craft {
                item: "Armbinder".into(),
                ..Craft::default()
            })],
            CraftEncoding::ItemProperty,
        );

        assert!(!restore_overflow(
            &host,
            "Female3DCG",
            &mut slots,
            &cache,
            CraftEncoding::ItemProperty,
        ));
        assert_eq!(slots.len(), CLIENT_SLOT_COUNT + 1);
    }

    #[test]
    fn test_restore_overflow_respects_slot_cap() {
        let host = LocalHost::standard();
        let crafts: Vec<Option<Craft>> = (0..SLOT_COUNT)
            .map(|i| {
                Some(Craft {
                    item: "Armbinder".into(),
                    name: format!("Binder {i}"),
                    ..Craft::default()
                })
            })
            .collect();
        let cache = serialize_crafts(&crafts, CraftEncoding::ItemProperty);

        let mut slots = Vec::new();
        restore_overflow(
            &host,
            "Female3DCG",
            &mut slots,
            &cache,
            CraftEncoding::ItemProperty,
        );
        assert_eq!(slots.len(), SLOT_COUNT);
    }

    #[test]
    fn test_overflow_cache_covers_only_the_tail() {
        let craft = Craft {
            item: "Armbinder".into(),
            name: "Binder".into(),
            ..Craft::default()
        };
        let mut slots = vec![None; CLIENT_SLOT_COUNT];
        assert!(overflow_cache(&slots, CraftEncoding::ItemProperty).is_empty());

        slots.push(Some(craft.clone()));
        let cache = overflow_cache(&slots, CraftEncoding::ItemProperty);
        let parsed = parse_crafts(&cache, CraftEncoding::ItemProperty);
        assert_eq!(parsed, vec![Some(craft)]);
    }

    #[test]
    fn test_clamp_chars_is_code_point_safe() {
        assert_eq!(clamp_chars("héllo", 2), "hé");
        assert_eq!(clamp_chars("ab", 5), "ab");
    }
}
