//! The boundary between the engine and the club client. The client's loader
//! implements [`Host`] and hands it to [`Session::attach`](crate::Session);
//! every read of client state and every mutation the engine performs goes
//! through this trait. The boundary is versioned: attaching fails unless the
//! host was built against the current [`API_VERSION`].

pub mod local;

use std::sync::Arc;

use crate::club::model::{Asset, Character, Group, TypeRecord};
use crate::club::wheel::options::WheelOption;
use crate::meta::settings::SharedSettings;
use crate::meta::version::ClientVersion;

pub use local::LocalHost;

/// Bumped whenever the [`Host`] surface changes incompatibly.
pub const API_VERSION: u32 = 4;

/// Capabilities the club client provides to the engine.
pub trait Host {
    /// The [`API_VERSION`] the host was built against.
    fn api_version(&self) -> u32;

    /// The club client's own build tag, e.g. `R94Beta1`.
    fn client_version(&self) -> ClientVersion;

    // Data model reads.

    fn asset(&self, family: &str, group: &str, name: &str) -> Option<Arc<Asset>>;

    /// Find an asset by name alone, searching every group of the family.
    fn asset_by_name(&self, family: &str, name: &str) -> Option<Arc<Asset>>;

    fn group(&self, family: &str, name: &str) -> Option<Arc<Group>>;

    /// Total number of groups in the family, across all categories.
    fn group_count(&self, family: &str) -> usize;

    /// A throwaway character with no inventory or restrictions, used for
    /// neutral sorting and previews.
    fn dummy_character(&self) -> Character;

    // Environment predicates.

    /// Whether the group is administratively blocked for the character.
    fn group_blocked_for(&self, character: &Character, group: &str) -> bool;

    /// Whether an owner rule forbids touching the group.
    fn group_blocked_by_owner(&self, character: &Character, group: &str) -> bool;

    /// Whether the character's permission settings block or limit the asset.
    fn blocked_or_limited(&self, character: &Character, asset: &Asset) -> bool;

    /// Whether the current room admits assets with these categories.
    fn room_allows(&self, categories: &[String]) -> bool;

    fn is_club_slave(&self, character: &Character) -> bool;

    /// Whether the character's keys are currently deposited out of reach.
    fn keys_deposited(&self, character: &Character) -> bool;

    /// Whether an active rule forbids the character using keys on their own
    /// locks.
    fn keyuse_blocked_by_rule(&self, character: &Character) -> bool;

    /// First unmet prerequisite for equipping the asset, if any.
    fn unmet_prerequisite(&self, character: &Character, asset: &Asset) -> Option<String>;

    /// The character's bondage skill with buffs applied.
    fn bondage_skill(&self, character: &Character) -> i32;

    /// Client clock in milliseconds.
    fn now_ms(&self) -> i64;

    // Mutation primitives.

    /// Equip `asset` into its group, replacing any occupant. `difficulty` is
    /// added on top of the asset's base difficulty. Returns the new item's
    /// index in the appearance list. No refresh.
    fn create_item(
        &self,
        character: &mut Character,
        asset: &Arc<Asset>,
        color: Vec<String>,
        difficulty: i32,
    ) -> usize;

    /// Vacate a group. A no-op when the group is already empty.
    fn remove_item(&self, character: &mut Character, group: &str);

    /// Apply a merged type record to the item at `index`, rebuilding its
    /// baseline property. No refresh, no push.
    fn apply_type_record(
        &self,
        character: &mut Character,
        index: usize,
        record: &TypeRecord,
    ) -> eyre::Result<()>;

    /// Apply the item's craft record to the client's crafting bookkeeping.
    fn apply_craft(&self, character: &mut Character, index: usize);

    /// Attach a lock asset to the item at `index`, recording the locking
    /// member.
    fn attach_lock(&self, character: &mut Character, index: usize, lock: &Arc<Asset>);

    /// Recompute the character's visual state. Called once per batch.
    fn refresh(&self, character: &mut Character);

    /// Push the character's appearance to the room. Player only.
    fn push_appearance(&self, character: &Character);

    // Shell integration.

    /// Wheel option IDs already taken by the client or other mods.
    fn taken_option_ids(&self) -> Vec<char>;

    fn register_option(&self, option: &WheelOption);

    fn retire_option(&self, id: char);

    /// The stored settings blob for this player, if any.
    fn load_settings_blob(&self) -> Option<String>;

    /// Persist the full blob and publish the shared view to the room.
    fn store_settings(&self, blob: &str, shared: &SharedSettings);

    /// Notify the player out-of-band (account beep).
    fn beep(&self, title: &str, message: &str);
}
