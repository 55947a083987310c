//! A wheel-of-fortune outfit engine for the club game client. The client
//! hands the crate a [`Host`] adapter; the crate owns the persisted wheel
//! configuration, registers one wedge per item set and lock flag, and runs
//! the full equip pipeline when a registered wedge comes up.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use eyre::{bail, ensure, Result};

pub mod club;
pub mod host;
pub mod logging;
pub mod meta;

use crate::club::model::Character;
use crate::club::outfits::OutfitCollection;
use crate::club::wheel::equip::{
    equip_outfit, register_builtin_validators, EquipReport, EquipRequest,
};
use crate::club::wheel::events::HookRegistry;
use crate::club::wheel::graph::sort_for_display;
use crate::club::wheel::options::{
    allocate_ids, options_for_set, OptionBook, OptionEntry, SetSource, BUILTIN_SETS,
};
use crate::club::wheel::ItemSet;
use crate::club::{crafting, wheel::WheelItem};
use crate::host::Host;
use crate::meta::settings::{self, LoadOutcome, Settings, MAX_ITEM_SETS};
use crate::meta::version::ModVersion;

/// An attached mod instance: the host handle, the loaded settings, the hook
/// registry, and the meaning of every wheel option registered so far.
pub struct Session {
    host: Arc<dyn Host>,
    settings: Settings,
    registry: HookRegistry,
    options: OptionBook,
}

impl Session {
    /// Wire the engine up to a host: check the API version, load and migrate
    /// stored settings, register the builtin validators and every wedge the
    /// builtin and stored item sets contribute, then publish the settings.
    pub fn attach(host: Arc<dyn Host>) -> Result<Session> {
        ensure!(
            host.api_version() == host::API_VERSION,
            "Host was built against API version {}, this build expects {}",
            host.api_version(),
            host::API_VERSION
        );

        let blob = host.load_settings_blob();
        let (mut settings, outcome) = settings::load(blob.as_deref())?;

        // Stored sets that no longer resolve against the host's roster are
        // dropped rather than left to fail on every spin.
        let family = host.dummy_character().asset_family;
        for index in 0..MAX_ITEM_SETS {
            let broken = match settings.item_set(index) {
                Some(set) => match set.validate(host.as_ref(), &family) {
                    Ok(()) => None,
                    Err(error) => Some(error),
                },
                None => None,
            };
            if let Some(error) = broken {
                log::warn!("Dropping stored item set {index}: {error:#}");
                settings.put_item_set(index, None)?;
            }
        }

        let mut registry = HookRegistry::default();
        register_builtin_validators(&mut registry, &host);

        let mut session = Session {
            host,
            settings,
            registry,
            options: OptionBook::default(),
        };

        for (index, set) in BUILTIN_SETS.iter().enumerate() {
            session.register_set_options(SetSource::Builtin(index), set)?;
        }
        for index in 0..MAX_ITEM_SETS {
            let Some(set) = session.settings.item_set(index).cloned() else {
                continue;
            };
            session.register_set_options(SetSource::User(index), &set)?;
        }

        if let LoadOutcome::Upgraded { from } = outcome {
            session.host.beep(
                "Carousel",
                &format!(
                    "Updated from {from} to {}. Spin the wheel to see what's new.",
                    ModVersion::current()
                ),
            );
        }

        settings::publish(session.host.as_ref(), &session.settings)?;
        log::info!(
            "Attached version {} to club client {}",
            ModVersion::current(),
            session.host.client_version()
        );
        Ok(session)
    }

    /// Resolve a spun wedge to its item set and run the equip pipeline with
    /// the set's strip level, hooks and the wedge's lock flag.
    pub fn spin(&self, id: char, character: &mut Character) -> Result<EquipReport> {
        let Some(entry) = self.options.resolve(id) else {
            bail!("No wheel option registered under id {id:?}");
        };
        let set = match entry.source {
            SetSource::Builtin(index) => BUILTIN_SETS.get(index),
            SetSource::User(index) => self.settings.item_set(index),
        };
        let Some(set) = set else {
            bail!("Wheel option {id:?} points at an empty item set slot");
        };

        let items = set.runnable_items(self.host.as_ref(), character);
        let mut request = EquipRequest::new(&set.name, items);
        request.strip_level = set.strip_level;
        request.active_hooks = set.active_hooks.clone();
        request.lock_flag = Some(entry.flag);
        equip_outfit(self.host.as_ref(), &self.registry, character, &request)
    }

    /// Replace one user item set slot. The stored items are re-sorted into
    /// equip order; the slot's old wedges are retired and fresh ones are
    /// registered before the settings go back out.
    pub fn set_item_set(&mut self, index: usize, set: Option<ItemSet>) -> Result<()> {
        ensure!(
            index < MAX_ITEM_SETS,
            "Item set slot {index} is out of range (wheel has {MAX_ITEM_SETS})"
        );
        let set = match set {
            Some(mut set) => {
                let family = self.host.dummy_character().asset_family;
                set.validate(self.host.as_ref(), &family)?;
                set.items = sort_for_display(self.host.as_ref(), &set.items)?;
                Some(set)
            }
            None => None,
        };

        self.retire_set_options(SetSource::User(index));
        if let Some(set) = &set {
            self.register_set_options(SetSource::User(index), set)?;
        }
        self.settings.put_item_set(index, set)?;
        settings::publish(self.host.as_ref(), &self.settings)
    }

    /// Merge the cached crafting overflow into the character's slot list,
    /// then refresh the cache from what they now carry.
    pub fn restore_crafting(&mut self, character: &mut Character) -> Result<()> {
        let encoding = crafting::CraftEncoding::for_client(self.host.client_version());
        let family = character.asset_family.clone();
        let merged = crafting::restore_overflow(
            self.host.as_ref(),
            &family,
            &mut character.crafting,
            &self.settings.crafting_cache,
            encoding,
        );
        if merged {
            log::info!("Restored the crafting overflow for {:?}", character.name);
        }

        let cache = crafting::overflow_cache(&character.crafting, encoding);
        if cache != self.settings.crafting_cache {
            self.settings.crafting_cache = cache;
            settings::publish(self.host.as_ref(), &self.settings)?;
        }
        Ok(())
    }

    /// Save an outfit under a `/`-separated path and publish the settings.
    pub fn save_outfit(&mut self, path: &str, items: BTreeMap<String, WheelItem>) -> Result<u64> {
        let id = self.settings.outfits.insert(path, items)?;
        settings::publish(self.host.as_ref(), &self.settings)?;
        Ok(id)
    }

    /// Remove a saved outfit. Returns whether anything was there.
    pub fn remove_outfit(&mut self, path: &str) -> Result<bool> {
        let removed = self.settings.outfits.remove(path).is_some();
        if removed {
            settings::publish(self.host.as_ref(), &self.settings)?;
        }
        Ok(removed)
    }

    pub fn rename_outfit(&mut self, from: &str, to: &str) -> Result<()> {
        self.settings.outfits.rename(from, to)?;
        settings::publish(self.host.as_ref(), &self.settings)
    }

    /// Equip a saved outfit directly, without a wheel spin or a lock.
    pub fn equip_saved_outfit(&self, path: &str, character: &mut Character) -> Result<EquipReport> {
        let Some(outfit) = self.settings.outfits.get(path) else {
            bail!("No saved outfit at {path:?}");
        };
        let request = EquipRequest::new(outfit.name.clone(), outfit.wheel_items());
        equip_outfit(self.host.as_ref(), &self.registry, character, &request)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn outfits(&self) -> &OutfitCollection {
        &self.settings.outfits
    }

    pub fn options(&self) -> &OptionBook {
        &self.options
    }

    /// The hook registry, for listener modules extending the pipeline.
    pub fn registry_mut(&mut self) -> &mut HookRegistry {
        &mut self.registry
    }

    fn register_set_options(&mut self, source: SetSource, set: &ItemSet) -> Result<()> {
        // Hidden sets stay in storage but put nothing on the wheel.
        if set.hidden {
            return Ok(());
        }
        let flags: Vec<_> = set.enabled_flags().copied().collect();
        if flags.is_empty() {
            return Ok(());
        }
        let taken: BTreeSet<char> = self
            .host
            .taken_option_ids()
            .into_iter()
            .chain(self.options.ids())
            .collect();
        let ids = allocate_ids(&taken, flags.len())?;

        for (option, flag) in options_for_set(set, &ids).iter().zip(flags) {
            self.host.register_option(option);
            self.options.insert(option.id, OptionEntry { source, flag });
        }
        Ok(())
    }

    fn retire_set_options(&mut self, source: SetSource) {
        for id in self.options.retire_source(source) {
            self.host.retire_option(id);
        }
    }
}
