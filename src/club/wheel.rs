//! The fortune-wheel subsystem: blocking-graph ordering, the equip pipeline
//! and its event registry, lock flags, and wheel option bookkeeping.

pub mod equip;
pub mod events;
pub mod graph;
pub mod locks;
pub mod options;

use eyre::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::club::model::{Asset, Character, ColorSpec, Craft, ItemProperties, TypeRecord};
use crate::club::wheel::events::ActiveHooks;
use crate::club::wheel::locks::{LockFlag, TIMER_MAX_MINUTES};
use crate::host::Host;

/// How much of the current appearance to clear before equipping, and which
/// appearance layers of a set to put on.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StripLevel {
    None,
    Clothes,
    #[default]
    Underwear,
    Cosplay,
    All,
}

/// Whether `level` covers the given appearance asset for this character.
/// Body-cosplay assets are only covered when the character may change them.
pub fn level_permits(level: StripLevel, character: &Character, asset: &Asset) -> bool {
    match level {
        StripLevel::None => false,
        StripLevel::Clothes => {
            asset.group.allow_none && !asset.body_cosplay && !asset.group.underwear
        }
        StripLevel::Underwear => asset.group.allow_none && !asset.body_cosplay,
        StripLevel::Cosplay => {
            if character.cosplay_blocked {
                asset.group.allow_none && !asset.body_cosplay
            } else {
                asset.group.allow_none
            }
        }
        StripLevel::All => {
            if character.cosplay_blocked {
                asset.group.allow_none && !asset.body_cosplay
            } else {
                true
            }
        }
    }
}

/// One entry of an item set: the asset reference plus everything the pipeline
/// seeds the item with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelItem {
    pub group: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_record: Option<TypeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<ItemProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft: Option<Craft>,
}

impl WheelItem {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> WheelItem {
        WheelItem {
            group: group.into(),
            name: name.into(),
            color: None,
            type_record: None,
            property: None,
            craft: None,
        }
    }
}

/// A lock flag together with whether the set currently spins with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFlagState {
    pub flag: LockFlag,
    pub enabled: bool,
}

/// The canonical flag roster new sets start with. The four-hour timer and the
/// high-security padlock exist but spin disabled until opted into.
pub fn default_flags() -> Vec<LockFlagState> {
    LockFlag::CANONICAL
        .iter()
        .map(|&flag| LockFlagState {
            enabled: !matches!(flag, LockFlag::HighSecurity | LockFlag::Timer { minutes: 240 }),
            flag,
        })
        .collect()
}

/// A named wheel entry: the items to equip plus how to equip them. These are
/// what user settings persist and what the builtin roster provides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSet {
    pub name: String,
    pub items: Vec<WheelItem>,
    #[serde(default)]
    pub strip_level: StripLevel,
    #[serde(default)]
    pub equip_level: StripLevel,
    #[serde(default = "default_flags")]
    pub flags: Vec<LockFlagState>,
    #[serde(default)]
    pub active_hooks: ActiveHooks,
    #[serde(default)]
    pub hidden: bool,
}

impl ItemSet {
    pub fn new(name: impl Into<String>, items: Vec<WheelItem>) -> ItemSet {
        ItemSet {
            name: name.into(),
            items,
            strip_level: StripLevel::default(),
            equip_level: StripLevel::default(),
            flags: default_flags(),
            active_hooks: ActiveHooks::new(),
            hidden: false,
        }
    }

    pub fn enabled_flags(&self) -> impl Iterator<Item = &LockFlag> {
        self.flags
            .iter()
            .filter(|state| state.enabled)
            .map(|state| &state.flag)
    }

    /// The subset of `items` the equip level admits for this character:
    /// every restraint, plus the appearance layers the level covers.
    pub fn runnable_items(&self, host: &dyn Host, character: &Character) -> Vec<WheelItem> {
        self.items
            .iter()
            .filter(|item| {
                match host.asset(&character.asset_family, &item.group, &item.name) {
                    // Unknown assets stay in; the pipeline records them as
                    // per-item failures with a proper reason.
                    None => true,
                    Some(asset) if asset.group.is_item() => true,
                    Some(asset) => level_permits(self.equip_level, character, &asset),
                }
            })
            .cloned()
            .collect()
    }

    /// Reject malformed sets before they reach settings or the wheel.
    pub fn validate(&self, host: &dyn Host, family: &str) -> Result<()> {
        ensure!(!self.name.is_empty(), "item set has no name");
        ensure!(
            self.name.len() <= 100,
            "item set name {:?} is too long",
            self.name
        );
        ensure!(!self.items.is_empty(), "item set {:?} has no items", self.name);
        for item in &self.items {
            if host.asset(family, &item.group, &item.name).is_none() {
                bail!(
                    "item set {:?} references unknown asset {}/{}",
                    self.name,
                    item.group,
                    item.name
                );
            }
        }
        for state in &self.flags {
            if let LockFlag::Timer { minutes } = state.flag {
                ensure!(
                    minutes <= TIMER_MAX_MINUTES,
                    "item set {:?} has a {minutes}-minute timer flag (max {TIMER_MAX_MINUTES})",
                    self.name
                );
            }
        }
        Ok(())
    }
}
