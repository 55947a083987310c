//! The persisted settings tree and its account-data codec. Settings travel
//! as base64-wrapped zlib-compressed JSON; loading is tolerant of garbage
//! (fresh defaults) but refuses blobs written by a newer build.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use eyre::{bail, ensure, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::club::outfits::OutfitCollection;
use crate::club::wheel::ItemSet;
use crate::host::Host;
use crate::meta::version::ModVersion;

/// Fixed number of item set slots a wheel configuration carries.
pub const MAX_ITEM_SETS: usize = 16;

/// Everything the mod persists for one player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub version: ModVersion,
    /// Always exactly [`MAX_ITEM_SETS`] entries after [`normalize`].
    ///
    /// [`normalize`]: Settings::normalize
    #[serde(
        default,
        alias = "fortuneWheelSets",
        alias = "FortuneWheelSets",
        deserialize_with = "lenient_sets"
    )]
    item_sets: Vec<Option<ItemSet>>,
    /// Serialized crafting overflow, in the host's own record format.
    #[serde(default)]
    pub crafting_cache: String,
    #[serde(default)]
    pub outfits: OutfitCollection,
}

/// The subset of [`Settings`] other players get to see.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSettings {
    pub version: ModVersion,
    pub item_sets: Vec<Option<ItemSet>>,
}

/// How a stored blob related to the running build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No usable blob; defaults were handed out.
    Fresh,
    /// Blob written by this very version.
    Loaded,
    /// Blob written by an older version and migrated forward.
    Upgraded { from: ModVersion },
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            version: ModVersion::current(),
            item_sets: vec![None; MAX_ITEM_SETS],
            crafting_cache: String::new(),
            outfits: OutfitCollection::default(),
        }
    }
}

impl Settings {
    /// Pad or trim the set list to exactly [`MAX_ITEM_SETS`] entries.
    pub fn normalize(&mut self) {
        if self.item_sets.len() > MAX_ITEM_SETS {
            log::warn!(
                "Discarding {} item set slot(s) beyond the wheel's capacity",
                self.item_sets.len() - MAX_ITEM_SETS
            );
        }
        self.item_sets.resize(MAX_ITEM_SETS, None);
    }

    pub fn item_sets(&self) -> &[Option<ItemSet>] {
        &self.item_sets
    }

    pub fn item_set(&self, index: usize) -> Option<&ItemSet> {
        self.item_sets.get(index).and_then(Option::as_ref)
    }

    /// Store `set` in the given slot. The slot count is fixed, so an index
    /// past the wheel's capacity is refused.
    pub fn put_item_set(&mut self, index: usize, set: Option<ItemSet>) -> Result<()> {
        ensure!(
            index < MAX_ITEM_SETS,
            "Item set slot {index} is out of range (wheel has {MAX_ITEM_SETS})"
        );
        // Blobs decoded without `load` may carry a short list.
        if self.item_sets.len() < MAX_ITEM_SETS {
            self.item_sets.resize(MAX_ITEM_SETS, None);
        }
        self.item_sets[index] = set;
        Ok(())
    }

    /// The view published to the room: hidden sets read as empty slots.
    pub fn shared(&self) -> SharedSettings {
        SharedSettings {
            version: self.version,
            item_sets: self
                .item_sets
                .iter()
                .map(|slot| slot.as_ref().filter(|set| !set.hidden).cloned())
                .collect(),
        }
    }
}

/// Per-entry tolerant set-list parse: a malformed entry costs that slot, not
/// the whole blob.
fn lenient_sets<'de, D>(deserializer: D) -> std::result::Result<Vec<Option<ItemSet>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|value| {
            if value.is_null() {
                return None;
            }
            match serde_json::from_value::<ItemSet>(value) {
                Ok(set) => Some(set),
                Err(error) => {
                    log::warn!("Dropping malformed item set from settings: {error}");
                    None
                }
            }
        })
        .collect())
}

/// Settings to account-data blob: JSON, zlib, base64.
pub fn encode_blob(settings: &Settings) -> Result<String> {
    let json = serde_json::to_vec(settings)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

pub fn decode_blob(blob: &str) -> Result<Settings> {
    let compressed = STANDARD.decode(blob.trim().as_bytes())?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Turn a stored blob into usable settings. An unreadable blob is discarded
/// with a warning; a blob from a newer build is an error, since loading it
/// here would silently roll the player back.
pub fn load(blob: Option<&str>) -> Result<(Settings, LoadOutcome)> {
    let blob = match blob {
        Some(blob) if !blob.trim().is_empty() => blob,
        _ => return Ok((Settings::default(), LoadOutcome::Fresh)),
    };

    let mut settings = match decode_blob(blob) {
        Ok(settings) => settings,
        Err(error) => {
            log::warn!("Discarding unreadable settings blob: {error:#}");
            return Ok((Settings::default(), LoadOutcome::Fresh));
        }
    };

    let current = ModVersion::current();
    if settings.version > current {
        bail!(
            "Settings were written by version {} but this build is {current}",
            settings.version
        );
    }
    let outcome = if settings.version < current {
        LoadOutcome::Upgraded {
            from: settings.version,
        }
    } else {
        LoadOutcome::Loaded
    };
    settings.version = current;
    settings.normalize();
    Ok((settings, outcome))
}

/// Persist the full tree and publish the shared view to the room.
pub fn publish(host: &dyn Host, settings: &Settings) -> Result<()> {
    let blob = encode_blob(settings)?;
    host.store_settings(&blob, &settings.shared());
    Ok(())
}
