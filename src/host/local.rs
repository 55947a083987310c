//! An in-process [`Host`] backed by a fixed slice of the club's asset
//! roster. Tests and demos run the whole engine against it without a client
//! attached; the counters and setters exist so they can observe and steer
//! the parts a real client would drive.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use eyre::{bail, Result};

use crate::club::extended;
use crate::club::model::{
    validate_color, Archetype, Asset, Character, ExtendedConfig, ExtendedModule, ExtendedOption,
    Group, GroupCategory, Item, ItemProperties, TypeRecord, ENCLOSE, LOCK,
};
use crate::club::wheel::options::WheelOption;
use crate::host::{Host, API_VERSION};
use crate::meta::settings::SharedSettings;
use crate::meta::version::ClientVersion;

/// The only asset family the fixture carries.
const FAMILY: &str = "Female3DCG";

/// Frozen clock, so timer arithmetic is reproducible.
const NOW_MS: i64 = 1_700_000_000_000;

/// Environment state the [`Host`] predicates read.
#[derive(Default)]
struct Environment {
    keys_deposited: bool,
    keyuse_blocked: bool,
    club_slave: bool,
    blocked_groups: BTreeSet<String>,
    owner_rules: BTreeSet<String>,
    limited_assets: BTreeSet<String>,
    denied_categories: BTreeSet<String>,
    prerequisites: BTreeMap<String, String>,
    bondage_skill: i32,
    refreshes: usize,
    pushes: usize,
}

/// Shell-side bookkeeping: wheel registrations, stored settings, beeps.
#[derive(Default)]
struct Shell {
    taken_ids: Vec<char>,
    options: Vec<WheelOption>,
    blob: Option<String>,
    shared: Option<SharedSettings>,
    beeps: Vec<(String, String)>,
}

pub struct LocalHost {
    client_version: ClientVersion,
    groups: BTreeMap<String, Arc<Group>>,
    /// Keyed by (group name, asset name).
    assets: BTreeMap<(String, String), Arc<Asset>>,
    env: Mutex<Environment>,
    shell: Mutex<Shell>,
}

impl LocalHost {
    /// A host carrying the standard roster: every item group the builtin
    /// sets touch, a few appearance groups, and the full padlock drawer.
    pub fn standard() -> LocalHost {
        let mut host = LocalHost {
            client_version: ClientVersion {
                release: 94,
                beta: Some(1),
            },
            groups: BTreeMap::new(),
            assets: BTreeMap::new(),
            env: Mutex::new(Environment {
                bondage_skill: 2,
                ..Environment::default()
            }),
            shell: Mutex::new(Shell::default()),
        };

        for name in [
            "ItemArms",
            "ItemHands",
            "ItemHandheld",
            "ItemNeck",
            "ItemNeckAccessories",
            "ItemMouth",
            "ItemHead",
            "ItemHood",
            "ItemEars",
            "ItemTorso",
            "ItemPelvis",
            "ItemLegs",
            "ItemFeet",
            "ItemDevices",
            "ItemMisc",
        ] {
            host.add_group(name, GroupCategory::Item, false);
        }
        host.add_group("Cloth", GroupCategory::Appearance, false);
        host.add_group("Bra", GroupCategory::Appearance, true);
        host.add_group("TailStraps", GroupCategory::Appearance, false);

        host.add_asset("ItemArms", "Armbinder", |asset| {
            asset.block = vec!["ItemHands".into()];
            asset.difficulty = 3;
        });
        host.add_asset("ItemArms", "FuturisticCuffs", |asset| {
            asset.difficulty = 2;
        });
        host.add_asset("ItemHands", "LeatherMittens", |asset| {
            asset.block = vec!["ItemHandheld".into()];
            asset.difficulty = 1;
        });
        host.add_asset("ItemHands", "FuturisticMittens", |asset| {
            asset.block = vec!["ItemHandheld".into()];
            asset.difficulty = 2;
        });
        host.add_asset("ItemHandheld", "Bell", |asset| {
            asset.allow_lock = false;
        });
        host.add_asset("ItemNeck", "PostureCollar", |asset| {
            asset.block = vec!["ItemNeckAccessories".into()];
        });
        host.add_asset("ItemNeck", "LeatherCollar", |_| {});
        host.add_asset("ItemNeck", "BonedNeckCorset", |asset| {
            asset.difficulty = 1;
        });
        host.add_asset("ItemNeckAccessories", "CollarAutoShockUnit", |_| {});
        host.add_asset("ItemMouth", "HarnessBallGag", |asset| {
            asset.difficulty = 1;
        });
        host.add_asset("ItemMouth", "FuturisticMuzzle", |asset| {
            asset.difficulty = 2;
        });
        host.add_asset("ItemHead", "InteractiveVRHeadset", |asset| {
            asset.extended = Some(ExtendedConfig {
                archetype: Archetype::Typed,
                modules: vec![ExtendedModule {
                    key: "typed".into(),
                    name: "Display".into(),
                    options: vec![
                        ExtendedOption {
                            name: "Off".into(),
                            property: ItemProperties::default(),
                        },
                        ExtendedOption {
                            name: "Immersive".into(),
                            property: ItemProperties {
                                effects: Some(vec!["BlindHeavy".into()]),
                                ..ItemProperties::default()
                            },
                        },
                    ],
                }],
            });
        });
        host.add_asset("ItemHood", "ExtremeHood", |asset| {
            asset.difficulty = 4;
            asset.extended = Some(ExtendedConfig {
                archetype: Archetype::Typed,
                modules: vec![ExtendedModule {
                    key: "typed".into(),
                    name: "Seal".into(),
                    options: vec![
                        ExtendedOption {
                            name: "Open".into(),
                            property: ItemProperties::default(),
                        },
                        ExtendedOption {
                            name: "Sealed".into(),
                            property: ItemProperties {
                                effects: Some(vec![ENCLOSE.into()]),
                                ..ItemProperties::default()
                            },
                        },
                    ],
                }],
            });
        });
        host.add_asset("ItemEars", "FuturisticEarphones", |_| {});
        host.add_asset("ItemTorso", "FuturisticHarness", |asset| {
            asset.difficulty = 2;
        });
        host.add_asset("ItemPelvis", "SciFiPleasurePanties", |_| {});
        host.add_asset("ItemLegs", "FuturisticLegCuffs", |asset| {
            asset.difficulty = 2;
        });
        host.add_asset("ItemFeet", "FuturisticAnkleCuffs", |asset| {
            asset.difficulty = 1;
        });
        host.add_asset("ItemDevices", "FuturisticCrate", |asset| {
            asset.effects = vec![ENCLOSE.into()];
            asset.categories = vec!["Bondage".into()];
            asset.difficulty = 4;
        });
        for name in [
            "MetalPadlock",
            "SafewordPadlock",
            "ExclusivePadlock",
            "TimerPasswordPadlock",
            "PasswordPadlock",
            "CombinationPadlock",
            "HighSecurityPadlock",
            "MistressPadlock",
            "MistressTimerPadlock",
            "PandoraPadlock",
        ] {
            host.add_asset("ItemMisc", name, |asset| {
                asset.is_lock = true;
                asset.allow_lock = false;
            });
        }
        host.add_asset("Cloth", "TShirt", |asset| {
            asset.allow_lock = false;
        });
        host.add_asset("Cloth", "LatexBodysuit", |asset| {
            asset.allow_lock = false;
        });
        host.add_asset("Bra", "CottonBra", |asset| {
            asset.allow_lock = false;
        });
        host.add_asset("TailStraps", "WolfTail", |asset| {
            asset.allow_lock = false;
            asset.body_cosplay = true;
        });

        host
    }

    fn add_group(&mut self, name: &str, category: GroupCategory, underwear: bool) {
        let group = Group {
            family: FAMILY.into(),
            name: name.into(),
            category,
            allow_none: true,
            underwear,
            color_schema: Vec::new(),
        };
        self.groups.insert(name.into(), Arc::new(group));
    }

    /// Add an asset to the roster, or replace the one already there.
    pub fn add_asset(&mut self, group: &str, name: &str, configure: impl FnOnce(&mut Asset)) {
        let group = Arc::clone(self.groups.get(group).expect("unknown fixture group"));
        let mut asset = Asset {
            name: name.into(),
            description: name.into(),
            group,
            block: Vec::new(),
            effects: Vec::new(),
            categories: Vec::new(),
            default_color: Vec::new(),
            colorable_layer_count: 2,
            difficulty: 0,
            allow_lock: true,
            wear: true,
            enable: true,
            is_lock: false,
            body_cosplay: false,
            owner_only: false,
            lover_only: false,
            family_only: false,
            extended: None,
        };
        configure(&mut asset);
        self.assets
            .insert((asset.group.name.clone(), name.into()), Arc::new(asset));
    }

    /// A player character wearing the default casual outfit.
    pub fn character(&self, name: &str, member_number: u32) -> Character {
        let mut character = Character {
            name: name.into(),
            member_number,
            asset_family: FAMILY.into(),
            is_player: true,
            cosplay_blocked: false,
            appearance: Vec::new(),
            inventory: Vec::new(),
            crafting: Vec::new(),
        };
        for (group, name) in [
            ("Cloth", "TShirt"),
            ("Bra", "CottonBra"),
            ("TailStraps", "WolfTail"),
        ] {
            if let Some(asset) = self.asset(FAMILY, group, name) {
                let color = validate_color(&asset, None);
                character.appearance.push(Item {
                    asset,
                    color,
                    difficulty: 0,
                    property: ItemProperties::default(),
                    type_record: None,
                    craft: None,
                });
            }
        }
        character
    }

    pub fn set_keys_deposited(&mut self, deposited: bool) {
        self.env().keys_deposited = deposited;
    }

    pub fn set_keyuse_blocked(&mut self, blocked: bool) {
        self.env().keyuse_blocked = blocked;
    }

    pub fn set_club_slave(&mut self, slave: bool) {
        self.env().club_slave = slave;
    }

    pub fn set_bondage_skill(&mut self, skill: i32) {
        self.env().bondage_skill = skill;
    }

    pub fn block_group(&mut self, group: &str) {
        self.env().blocked_groups.insert(group.into());
    }

    pub fn add_owner_rule(&mut self, group: &str) {
        self.env().owner_rules.insert(group.into());
    }

    pub fn limit_asset(&mut self, name: &str) {
        self.env().limited_assets.insert(name.into());
    }

    pub fn deny_category(&mut self, category: &str) {
        self.env().denied_categories.insert(category.into());
    }

    pub fn set_prerequisite(&mut self, asset: &str, reason: &str) {
        self.env().prerequisites.insert(asset.into(), reason.into());
    }

    pub fn reserve_option_id(&mut self, id: char) {
        self.shell().taken_ids.push(id);
    }

    pub fn set_settings_blob(&mut self, blob: &str) {
        self.shell().blob = Some(blob.into());
    }

    /// How many times [`Host::refresh`] ran.
    pub fn refreshes(&self) -> usize {
        self.env().refreshes
    }

    /// How many times [`Host::push_appearance`] ran.
    pub fn pushes(&self) -> usize {
        self.env().pushes
    }

    pub fn registered_options(&self) -> Vec<WheelOption> {
        self.shell().options.clone()
    }

    pub fn stored_blob(&self) -> Option<String> {
        self.shell().blob.clone()
    }

    pub fn shared_settings(&self) -> Option<SharedSettings> {
        self.shell().shared.clone()
    }

    pub fn beeps(&self) -> Vec<(String, String)> {
        self.shell().beeps.clone()
    }

    fn env(&self) -> MutexGuard<'_, Environment> {
        self.env.lock().expect("Failed to lock host environment")
    }

    fn shell(&self) -> MutexGuard<'_, Shell> {
        self.shell.lock().expect("Failed to lock host shell")
    }
}

impl Host for LocalHost {
    fn api_version(&self) -> u32 {
        API_VERSION
    }

    fn client_version(&self) -> ClientVersion {
        self.client_version
    }

    fn asset(&self, family: &str, group: &str, name: &str) -> Option<Arc<Asset>> {
        if family != FAMILY {
            return None;
        }
        self.assets.get(&(group.into(), name.into())).cloned()
    }

    fn asset_by_name(&self, family: &str, name: &str) -> Option<Arc<Asset>> {
        if family != FAMILY {
            return None;
        }
        self.assets
            .iter()
            .find(|((_, candidate), _)| candidate.as_str() == name)
            .map(|(_, asset)| Arc::clone(asset))
    }

    fn group(&self, family: &str, name: &str) -> Option<Arc<Group>> {
        if family != FAMILY {
            return None;
        }
        self.groups.get(name).cloned()
    }

    fn group_count(&self, family: &str) -> usize {
        if family == FAMILY {
            self.groups.len()
        } else {
            0
        }
    }

    fn dummy_character(&self) -> Character {
        Character {
            name: "Preview".into(),
            member_number: 0,
            asset_family: FAMILY.into(),
            is_player: false,
            cosplay_blocked: false,
            appearance: Vec::new(),
            inventory: Vec::new(),
            crafting: Vec::new(),
        }
    }

    fn group_blocked_for(&self, _character: &Character, group: &str) -> bool {
        self.env().blocked_groups.contains(group)
    }

    fn group_blocked_by_owner(&self, _character: &Character, group: &str) -> bool {
        self.env().owner_rules.contains(group)
    }

    fn blocked_or_limited(&self, _character: &Character, asset: &Asset) -> bool {
        self.env().limited_assets.contains(&asset.name)
    }

    fn room_allows(&self, categories: &[String]) -> bool {
        let env = self.env();
        categories
            .iter()
            .all(|category| !env.denied_categories.contains(category))
    }

    fn is_club_slave(&self, _character: &Character) -> bool {
        self.env().club_slave
    }

    fn keys_deposited(&self, _character: &Character) -> bool {
        self.env().keys_deposited
    }

    fn keyuse_blocked_by_rule(&self, _character: &Character) -> bool {
        self.env().keyuse_blocked
    }

    fn unmet_prerequisite(&self, _character: &Character, asset: &Asset) -> Option<String> {
        self.env().prerequisites.get(&asset.name).cloned()
    }

    fn bondage_skill(&self, _character: &Character) -> i32 {
        self.env().bondage_skill
    }

    fn now_ms(&self) -> i64 {
        NOW_MS
    }

    fn create_item(
        &self,
        character: &mut Character,
        asset: &Arc<Asset>,
        color: Vec<String>,
        difficulty: i32,
    ) -> usize {
        let color = if color.is_empty() {
            validate_color(asset, None)
        } else {
            color
        };
        let item = Item {
            asset: Arc::clone(asset),
            color,
            difficulty: asset.difficulty + difficulty,
            property: ItemProperties::default(),
            type_record: None,
            craft: None,
        };
        match character.position_by_group(&asset.group.name) {
            Some(index) => {
                character.appearance[index] = item;
                index
            }
            None => {
                character.appearance.push(item);
                character.appearance.len() - 1
            }
        }
    }

    fn remove_item(&self, character: &mut Character, group: &str) {
        character.appearance.retain(|item| item.group_name() != group);
    }

    fn apply_type_record(
        &self,
        character: &mut Character,
        index: usize,
        record: &TypeRecord,
    ) -> Result<()> {
        let Some(item) = character.appearance.get_mut(index) else {
            bail!("No item at appearance index {index}");
        };
        extended::validate_record(&item.asset, record)?;
        item.type_record = Some(record.clone());
        item.property = extended::baseline_property(&item.asset, Some(record));
        Ok(())
    }

    fn apply_craft(&self, character: &mut Character, index: usize) {
        // The club mirrors worn craft records into chat bookkeeping; there
        // is nothing to mirror locally.
        let _ = (character, index);
    }

    fn attach_lock(&self, character: &mut Character, index: usize, lock: &Arc<Asset>) {
        let member = character.member_number;
        let Some(item) = character.appearance.get_mut(index) else {
            return;
        };
        if !item.asset.allow_lock {
            return;
        }
        let effects = item.property.effects.get_or_insert_with(Vec::new);
        if !effects.iter().any(|effect| effect == LOCK) {
            effects.push(LOCK.into());
        }
        item.property.locked_by = Some(lock.name.clone());
        item.property.lock_member_number = Some(member);
    }

    fn refresh(&self, _character: &mut Character) {
        self.env().refreshes += 1;
    }

    fn push_appearance(&self, _character: &Character) {
        self.env().pushes += 1;
    }

    fn taken_option_ids(&self) -> Vec<char> {
        self.shell().taken_ids.clone()
    }

    fn register_option(&self, option: &WheelOption) {
        let mut shell = self.shell();
        shell.taken_ids.push(option.id);
        shell.options.push(option.clone());
    }

    fn retire_option(&self, id: char) {
        let mut shell = self.shell();
        shell.taken_ids.retain(|&taken| taken != id);
        shell.options.retain(|option| option.id != id);
    }

    fn load_settings_blob(&self) -> Option<String> {
        self.shell().blob.clone()
    }

    fn store_settings(&self, blob: &str, shared: &SharedSettings) {
        let mut shell = self.shell();
        shell.blob = Some(blob.into());
        shell.shared = Some(shared.clone());
    }

    fn beep(&self, title: &str, message: &str) {
        self.shell().beeps.push((title.into(), message.into()));
    }
}
