//! Wheel option bookkeeping: the wedge palette, id allocation, the builtin
//! roster, and the id-to-meaning map a session keeps for its registrations.

use std::collections::{BTreeMap, BTreeSet};

use eyre::{ensure, Result};
use lazy_static::lazy_static;
use rand::seq::SliceRandom;

use crate::club::model::{ColorSpec, Craft, CraftProperty, TypeRecord};
use crate::club::wheel::locks::LockFlag;
use crate::club::wheel::{ItemSet, WheelItem};

/// Wedge colors the wheel accepts.
pub const WHEEL_COLORS: [&str; 8] = [
    "Blue", "Gold", "Gray", "Green", "Orange", "Purple", "Red", "Yellow",
];

/// One spinnable wedge as the host's wheel sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct WheelOption {
    /// Single UTF-16 code unit identifying the wedge.
    pub id: char,
    pub label: String,
    pub color: String,
    /// Whether a fresh wheel configuration starts with the wedge enabled.
    pub enabled_by_default: bool,
}

/// Where an option's item set lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetSource {
    Builtin(usize),
    User(usize),
}

/// What one wedge means when it comes up: which set, locked how.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionEntry {
    pub source: SetSource,
    pub flag: LockFlag,
}

/// Id-to-meaning map for every option a session has registered.
#[derive(Clone, Debug, Default)]
pub struct OptionBook {
    entries: BTreeMap<char, OptionEntry>,
}

impl OptionBook {
    pub fn resolve(&self, id: char) -> Option<OptionEntry> {
        self.entries.get(&id).copied()
    }

    pub fn insert(&mut self, id: char, entry: OptionEntry) {
        self.entries.insert(id, entry);
    }

    pub fn ids(&self) -> impl Iterator<Item = char> + '_ {
        self.entries.keys().copied()
    }

    /// Drop every option of `source` and return the ids to retire.
    pub fn retire_source(&mut self, source: SetSource) -> Vec<char> {
        let ids: Vec<char> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.source == source)
            .map(|(&id, _)| id)
            .collect();
        for id in &ids {
            self.entries.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Allocate `count` unused single-code-unit ids, scanning upward from NUL.
/// Surrogate code points can never be `char`s and are skipped, as is
/// everything in `taken`.
pub fn allocate_ids(taken: &BTreeSet<char>, count: usize) -> Result<Vec<char>> {
    let mut out = Vec::with_capacity(count);
    for code in 0u32..=0xFFFF {
        if out.len() == count {
            break;
        }
        let id = match char::from_u32(code) {
            Some(id) => id,
            None => continue,
        };
        if !taken.contains(&id) {
            out.push(id);
        }
    }
    ensure!(
        out.len() == count,
        "No free wheel option ids left (wanted {count})"
    );
    Ok(out)
}

/// Build the wedges one item set contributes: one per enabled lock flag,
/// labelled with the set name and the flag, colored at random from the
/// palette.
pub fn options_for_set(set: &ItemSet, ids: &[char]) -> Vec<WheelOption> {
    let mut rng = rand::thread_rng();
    set.enabled_flags()
        .zip(ids)
        .map(|(&flag, &id)| WheelOption {
            id,
            label: format!("{}: {}", set.name, flag.label()),
            color: WHEEL_COLORS
                .choose(&mut rng)
                .copied()
                .unwrap_or("Blue")
                .to_string(),
            enabled_by_default: !matches!(
                flag,
                LockFlag::HighSecurity | LockFlag::Timer { minutes: 240 }
            ),
        })
        .collect()
}

fn secure_craft(item: &str, name: &str, description: &str) -> Craft {
    Craft {
        item: item.into(),
        name: name.into(),
        description: description.into(),
        property: CraftProperty::Secure,
        private: true,
        ..Craft::default()
    }
}

fn chrome_cocoon() -> ItemSet {
    let mut items = Vec::new();

    let mut bodysuit = WheelItem::new("Cloth", "LatexBodysuit");
    bodysuit.color = Some(ColorSpec::Single("#0A0A0A".into()));
    items.push(bodysuit);

    let mut cuffs = WheelItem::new("ItemArms", "FuturisticCuffs");
    cuffs.craft = Some(secure_craft(
        "FuturisticCuffs",
        "Cocoon Cuffs",
        "Chromed steel, shut for good",
    ));
    items.push(cuffs);

    let mut mittens = WheelItem::new("ItemHands", "FuturisticMittens");
    mittens.craft = Some(secure_craft(
        "FuturisticMittens",
        "Cocoon Mittens",
        "No fingers to speak of",
    ));
    items.push(mittens);

    let mut visor = WheelItem::new("ItemHead", "InteractiveVRHeadset");
    visor.type_record = Some(TypeRecord::from([("typed".to_string(), 1)]));
    visor.craft = Some(secure_craft(
        "InteractiveVRHeadset",
        "Cocoon Visor",
        "Shows whatever it wants to",
    ));
    items.push(visor);

    let mut muzzle = WheelItem::new("ItemMouth", "FuturisticMuzzle");
    muzzle.craft = Some(secure_craft(
        "FuturisticMuzzle",
        "Cocoon Muzzle",
        "Silence, bottled",
    ));
    items.push(muzzle);

    let mut earphones = WheelItem::new("ItemEars", "FuturisticEarphones");
    earphones.craft = Some(secure_craft(
        "FuturisticEarphones",
        "Cocoon Earphones",
        "Plays one track, forever",
    ));
    items.push(earphones);

    let mut collar = WheelItem::new("ItemNeck", "BonedNeckCorset");
    collar.color = Some(ColorSpec::Layers(vec![
        "#222222".into(),
        "#8A8A8A".into(),
    ]));
    collar.craft = Some(secure_craft(
        "BonedNeckCorset",
        "Cocoon Collar",
        "Chin up",
    ));
    items.push(collar);

    let mut harness = WheelItem::new("ItemTorso", "FuturisticHarness");
    harness.craft = Some(secure_craft(
        "FuturisticHarness",
        "Cocoon Harness",
        "Holds the rest together",
    ));
    items.push(harness);

    let mut panties = WheelItem::new("ItemPelvis", "SciFiPleasurePanties");
    panties.craft = Some(secure_craft(
        "SciFiPleasurePanties",
        "Cocoon Panties",
        "Company property",
    ));
    items.push(panties);

    let mut leg_cuffs = WheelItem::new("ItemLegs", "FuturisticLegCuffs");
    leg_cuffs.craft = Some(secure_craft(
        "FuturisticLegCuffs",
        "Cocoon Leg Cuffs",
        "Knees together",
    ));
    items.push(leg_cuffs);

    let mut ankle_cuffs = WheelItem::new("ItemFeet", "FuturisticAnkleCuffs");
    ankle_cuffs.craft = Some(secure_craft(
        "FuturisticAnkleCuffs",
        "Cocoon Ankle Cuffs",
        "Small steps only",
    ));
    items.push(ankle_cuffs);

    ItemSet::new("Chrome Cocoon", items)
}

lazy_static! {
    /// The roster every wheel carries regardless of user settings.
    pub static ref BUILTIN_SETS: Vec<ItemSet> = vec![chrome_cocoon()];
}
