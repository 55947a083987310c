//! Data model shared with the club client: assets, groups, items and
//! characters. Everything here is plain data; mutation goes through the
//! [`Host`](crate::host::Host) primitives.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Effect name marking an item as fully encasing the wearer.
pub const ENCLOSE: &str = "Enclose";

/// Effect name marking an item as carrying an active lock.
pub const LOCK: &str = "Lock";

/// Slot category. The blocking graph only ever considers `Item` groups;
/// `Appearance` groups are what the strip phase clears.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum GroupCategory {
    Item,
    Appearance,
}

/// A body/equipment slot. Holds at most one [`Item`] at a time.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub family: String,
    pub name: String,
    pub category: GroupCategory,
    /// Whether the slot may be left empty, i.e. whether its occupant is
    /// removable at all.
    pub allow_none: bool,
    pub underwear: bool,
    /// Named colors the client accepts for this slot besides hex codes.
    pub color_schema: Vec<String>,
}

impl Group {
    pub fn is_item(&self) -> bool {
        self.category == GroupCategory::Item
    }

    pub fn is_appearance(&self) -> bool {
        self.category == GroupCategory::Appearance
    }
}

/// Extended-item archetype marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Typed,
    Modular,
    Vibrating,
    #[strum(serialize = "variableheight")]
    #[serde(rename = "variableheight")]
    VariableHeight,
}

/// One selectable option of an extended-item module. Selecting it overlays
/// `property` onto the item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedOption {
    pub name: String,
    #[serde(default)]
    pub property: ItemProperties,
}

/// A module of an extended item; `key` is what type records index by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtendedModule {
    pub key: String,
    pub name: String,
    pub options: Vec<ExtendedOption>,
}

/// Extended-item configuration attached to an [`Asset`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtendedConfig {
    pub archetype: Archetype,
    pub modules: Vec<ExtendedModule>,
}

impl ExtendedConfig {
    pub fn module(&self, key: &str) -> Option<&ExtendedModule> {
        self.modules.iter().find(|m| m.key == key)
    }
}

/// Selected extended-type options, keyed by module key.
pub type TypeRecord = BTreeMap<String, u32>;

/// Merge `src` into `dst`, overwriting on key collisions. Keys absent from
/// `src` are left alone.
pub fn merge_type_record(dst: &mut TypeRecord, src: &TypeRecord) {
    for (key, value) in src {
        dst.insert(key.clone(), *value);
    }
}

/// A wearable definition owned by the client. Read-only and shared.
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    pub name: String,
    /// Display name shown to players; also the default craft name.
    pub description: String,
    pub group: Arc<Group>,
    /// Groups this asset makes unequippable while worn.
    pub block: Vec<String>,
    pub effects: Vec<String>,
    pub categories: Vec<String>,
    pub default_color: Vec<String>,
    pub colorable_layer_count: usize,
    pub difficulty: i32,
    pub allow_lock: bool,
    pub wear: bool,
    pub enable: bool,
    pub is_lock: bool,
    pub body_cosplay: bool,
    pub owner_only: bool,
    pub lover_only: bool,
    pub family_only: bool,
    pub extended: Option<ExtendedConfig>,
}

impl Asset {
    pub fn has_effect(&self, effect: &str) -> bool {
        self.effects.iter().any(|e| e == effect)
    }

    /// Whether the asset can carry a craft record at all.
    pub fn craftable(&self) -> bool {
        self.group.is_item() && !self.is_lock && self.wear && self.enable
    }
}

/// Typed property record of an equipped item. All fields optional; a `None`
/// means "not set" and survives merges untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ItemProperties {
    #[serde(rename = "Effect", skip_serializing_if = "Option::is_none")]
    pub effects: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_member_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_number_list_keys: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_timer: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_item: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_set: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ItemProperties {
    /// Overlay every defined field of `other` onto `self`.
    pub fn merge_defined(&mut self, other: &ItemProperties) {
        macro_rules! take {
            ($($field:ident),+ $(,)?) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })+
            };
        }
        take!(
            effects,
            block,
            hide,
            difficulty,
            override_priority,
            locked_by,
            lock_member_number,
            member_number_list_keys,
            remove_timer,
            remove_item,
            lock_set,
            password,
        );
    }

    pub fn is_empty(&self) -> bool {
        *self == ItemProperties::default()
    }

    pub fn has_effect(&self, effect: &str) -> bool {
        self.effects
            .as_ref()
            .map_or(false, |e| e.iter().any(|x| x == effect))
    }
}

/// Craft property flavor. Unknown strings fail to parse; the crafting cache
/// repairs those to `Normal`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum CraftProperty {
    #[default]
    Normal,
    Large,
    Small,
    Thick,
    Thin,
    Secure,
    Loose,
    Decoy,
    Malleable,
    Mobile,
    Heavy,
    Light,
    Strong,
    Flexible,
    Nimble,
    Arousing,
    Dull,
    Puzzling,
    Simple,
    Comfy,
    Edging,
}

/// A craft record attached to an item: player-authored flavor plus a couple
/// of mechanical knobs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Craft {
    /// Asset name this craft applies to.
    pub item: String,
    pub name: String,
    pub description: String,
    pub property: CraftProperty,
    /// Lock asset name, or empty for none.
    pub lock: String,
    pub color: String,
    pub private: bool,
    /// Pre-type-record item type string kept for older client payloads.
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_property: Option<ItemProperties>,
}

impl Craft {
    /// The default craft record synthesized when craft hooks fire on an item
    /// that carries none.
    pub fn skeleton(asset: &Asset) -> Craft {
        Craft {
            item: asset.name.clone(),
            name: asset.description.clone(),
            private: true,
            ..Craft::default()
        }
    }
}

/// An asset instance equipped into a group slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub asset: Arc<Asset>,
    pub color: Vec<String>,
    pub difficulty: i32,
    pub property: ItemProperties,
    pub type_record: Option<TypeRecord>,
    pub craft: Option<Craft>,
}

impl Item {
    pub fn group_name(&self) -> &str {
        &self.asset.group.name
    }

    /// Whether the effect is active through either the asset or the property
    /// record.
    pub fn has_effect(&self, effect: &str) -> bool {
        self.asset.has_effect(effect) || self.property.has_effect(effect)
    }

    pub fn lock_name(&self) -> Option<&str> {
        self.property.locked_by.as_deref()
    }
}

/// A character with an appearance list. The engine mutates `appearance` only
/// through host primitives.
#[derive(Clone, Debug)]
pub struct Character {
    pub name: String,
    pub member_number: u32,
    pub asset_family: String,
    pub is_player: bool,
    /// Whether shared settings forbid changing body-cosplay slots.
    pub cosplay_blocked: bool,
    pub appearance: Vec<Item>,
    /// Owned inventory as (group, asset name) pairs.
    pub inventory: Vec<(String, String)>,
    /// Crafting slots; `None` marks an empty slot.
    pub crafting: Vec<Option<Craft>>,
}

impl Character {
    pub fn item_by_group(&self, group: &str) -> Option<&Item> {
        self.appearance.iter().find(|i| i.group_name() == group)
    }

    pub fn position_by_group(&self, group: &str) -> Option<usize> {
        self.appearance.iter().position(|i| i.group_name() == group)
    }

    pub fn has_inventory(&self, group: &str, name: &str) -> bool {
        self.inventory.iter().any(|(g, n)| g == group && n == name)
    }
}

/// Color payloads as they appear in stored bundles: either one color for all
/// layers or an explicit per-layer list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorSpec {
    Single(String),
    Layers(Vec<String>),
}

/// Hex color code check: `#RGB` or `#RRGGBB`.
pub fn is_color_code(value: &str) -> bool {
    let hex = match value.strip_prefix('#') {
        Some(hex) => hex,
        None => return false,
    };
    (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Whether `value` is acceptable for `asset`: a hex code, a schema color of
/// its group, or the `Default` placeholder.
pub fn color_allowed(asset: &Asset, value: &str) -> bool {
    value == "Default" || is_color_code(value) || asset.group.color_schema.iter().any(|c| c == value)
}

/// Resolve a stored color payload into a full per-layer list, falling back to
/// the asset's defaults for missing or unacceptable entries. The result is
/// always exactly `colorable_layer_count` long.
pub fn validate_color(asset: &Asset, color: Option<&ColorSpec>) -> Vec<String> {
    let mut out = asset.default_color.clone();
    out.resize(asset.colorable_layer_count.max(out.len()), "Default".into());
    out.truncate(asset.colorable_layer_count);
    match color {
        Some(ColorSpec::Single(value)) if color_allowed(asset, value) => {
            out.iter_mut().for_each(|slot| *slot = value.clone());
        }
        Some(ColorSpec::Layers(layers)) => {
            for (slot, value) in out.iter_mut().zip(layers) {
                if color_allowed(asset, value) {
                    *slot = value.clone();
                }
            }
        }
        _ => {}
    }
    out
}
