//! Typed pipeline events and the hook registry. Every pipeline stage is a
//! [`Stage`] type with its own event struct and listener output; listeners
//! are registered per stage and run in registration order. Activation is
//! gated per run by an [`ActiveHooks`] set: conditional hooks only run when
//! listed, and any hook missing a required kwarg is skipped for that run.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use eyre::{ensure, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::club::crafting::{CRAFT_DESCRIPTION_MAX, CRAFT_NAME_MAX};
use crate::club::extended;
use crate::club::model::{
    color_allowed, Asset, Character, Craft, CraftProperty, Group, Item, ItemProperties, TypeRecord,
};
use crate::club::wheel::locks::LockFlag;

/// Free-form arguments handed to a hook for one run.
pub type Kwargs = BTreeMap<String, Value>;

/// The hooks a run activates, keyed by [`HookId::key`], each with its kwargs.
pub type ActiveHooks = BTreeMap<String, Kwargs>;

/// Identity of a registered hook: the owning module plus the hook's name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HookId {
    pub module: String,
    pub hook: String,
}

impl HookId {
    pub fn new(module: impl Into<String>, hook: impl Into<String>) -> HookId {
        HookId {
            module: module.into(),
            hook: hook.into(),
        }
    }

    /// The form [`ActiveHooks`] keys by.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl Display for HookId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.hook)
    }
}

/// A kwarg a hook declares. Required kwargs gate the whole hook: missing one
/// from a run's active set skips the hook for that run entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KwargSpec {
    pub name: String,
    pub required: bool,
}

/// Registration metadata for one hook.
#[derive(Clone, Debug)]
pub struct HookMeta {
    pub id: HookId,
    /// Human-readable label shown in configuration UIs.
    pub label: String,
    pub kwargs: Vec<KwargSpec>,
    /// A conditional hook only runs when its id is in the active set.
    pub conditional: bool,
}

impl HookMeta {
    pub fn new(
        module: impl Into<String>,
        hook: impl Into<String>,
        label: impl Into<String>,
    ) -> HookMeta {
        HookMeta {
            id: HookId::new(module, hook),
            label: label.into(),
            kwargs: Vec::new(),
            conditional: false,
        }
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, required: bool) -> HookMeta {
        self.kwargs.push(KwargSpec {
            name: name.into(),
            required,
        });
        self
    }

    pub fn conditional(mut self) -> HookMeta {
        self.conditional = true;
        self
    }
}

/// What happened to one hook or pipeline step, for the debug log.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Disposition {
    Ran,
    Skipped(String),
    Rejected(String),
    Failed(String),
}

/// One line of the equip debug log.
#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub stage: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<Value>,
    #[serde(skip_serializing_if = "Kwargs::is_empty")]
    pub kwargs: Kwargs,
}

/// JSON-serializable record of every event and hook outcome in one batch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EquipLog {
    pub entries: Vec<LogEntry>,
}

impl EquipLog {
    /// Record a pipeline-level outcome for a group (rejection, item failure).
    pub fn note(&mut self, stage: &'static str, group: &str, disposition: Disposition) {
        self.entries.push(LogEntry {
            stage,
            hook: None,
            group: Some(group.to_owned()),
            disposition,
            event: None,
            kwargs: Kwargs::new(),
        });
    }

    /// Record a batch-level outcome, not tied to any one group.
    pub fn batch(&mut self, stage: &'static str, disposition: Disposition) {
        self.entries.push(LogEntry {
            stage,
            hook: None,
            group: None,
            disposition,
            event: None,
            kwargs: Kwargs::new(),
        });
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Implemented by every stage's event struct; produces the names-only
/// projection written to the debug log.
pub trait StageEvent {
    fn log_value(&self) -> Value;
}

/// A pipeline stage: its wire name, its event shape, and what listeners
/// return.
pub trait Stage: 'static {
    const NAME: &'static str;
    type Event<'a>: StageEvent;
    type Output;
}

fn item_name(item: Option<&Item>) -> Value {
    item.map_or(Value::Null, |i| Value::from(i.asset.name.as_str()))
}

/// Event for the observational batch boundaries.
pub struct OutfitEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
}

impl StageEvent for OutfitEvent<'_> {
    fn log_value(&self) -> Value {
        json!({ "outfit": self.outfit, "character": self.character.name })
    }
}

/// Event for unequip validation: the group about to be vacated or
/// overwritten. `new_asset` is `None` for removal-only (blocking) entries.
pub struct UnequipEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub group: &'a Arc<Group>,
    pub old_item: Option<&'a Item>,
    pub new_asset: Option<&'a Arc<Asset>>,
}

impl StageEvent for UnequipEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "group": self.group.name,
            "oldItem": item_name(self.old_item),
            "newAsset": self.new_asset.map(|a| a.name.as_str()),
        })
    }
}

/// Event for equip validation of a surviving target item.
pub struct EquipCheckEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub old_item: Option<&'a Item>,
    pub new_asset: &'a Arc<Asset>,
}

impl StageEvent for EquipCheckEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "oldItem": item_name(self.old_item),
            "newAsset": self.new_asset.name,
        })
    }
}

/// Named overrides a hook may propose for a craft record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CraftOverride {
    pub name: Option<String>,
    pub description: Option<String>,
    pub property: Option<CraftProperty>,
}

impl CraftOverride {
    pub(crate) fn apply_to(&self, craft: &mut Craft) {
        if let Some(name) = &self.name {
            craft.name = name.clone();
        }
        if let Some(description) = &self.description {
            craft.description = description.clone();
        }
        if let Some(property) = self.property {
            craft.property = property;
        }
    }
}

/// Pending configuration collected from `before-item-equip` setters.
#[derive(Clone, Debug, Default)]
pub(crate) struct ItemConfig {
    pub color: Option<Vec<String>>,
    pub craft: Option<CraftOverride>,
    pub type_record: Option<TypeRecord>,
    pub properties: Option<ItemProperties>,
    pub difficulty_modifier: i32,
}

/// The mutable pre-commit event. Reads are plain fields; writes go through
/// validating setters, and a setter error fails the item (not the batch).
/// The pipeline seeds the pending configuration from the wheel item itself,
/// so hooks see what would be applied if they did nothing.
pub struct ItemConfigEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub old_item: Option<&'a Item>,
    pub new_asset: &'a Arc<Asset>,
    /// The lock directive of the whole batch, if any.
    pub lock: Option<LockFlag>,
    config: ItemConfig,
}

impl<'a> ItemConfigEvent<'a> {
    pub(crate) fn new(
        outfit: &'a str,
        character: &'a Character,
        old_item: Option<&'a Item>,
        new_asset: &'a Arc<Asset>,
        lock: Option<LockFlag>,
        config: ItemConfig,
    ) -> ItemConfigEvent<'a> {
        ItemConfigEvent {
            outfit,
            character,
            old_item,
            new_asset,
            lock,
            config,
        }
    }

    /// Replace the item's pending color wholesale. Every layer must be a hex
    /// code, a schema color of the group, or `Default`, and the list may not
    /// exceed the asset's colorable layer count.
    pub fn set_color(&mut self, layers: Vec<String>) -> Result<()> {
        ensure!(
            layers.len() <= self.new_asset.colorable_layer_count,
            "{} color layers given, asset {:?} has {}",
            layers.len(),
            self.new_asset.name,
            self.new_asset.colorable_layer_count
        );
        for layer in &layers {
            ensure!(
                color_allowed(self.new_asset, layer),
                "color {layer:?} not accepted for asset {:?}",
                self.new_asset.name
            );
        }
        self.config.color = Some(layers);
        Ok(())
    }

    /// Seed the craft record. Names and descriptions are length-capped the
    /// way the client's crafting screen caps them.
    pub fn set_craft(&mut self, craft: CraftOverride) -> Result<()> {
        if let Some(name) = &craft.name {
            ensure!(!name.is_empty(), "craft name is empty");
            ensure!(
                name.chars().count() <= CRAFT_NAME_MAX,
                "craft name longer than {CRAFT_NAME_MAX} characters"
            );
        }
        if let Some(description) = &craft.description {
            ensure!(
                description.chars().count() <= CRAFT_DESCRIPTION_MAX,
                "craft description longer than {CRAFT_DESCRIPTION_MAX} characters"
            );
        }
        self.config.craft = Some(craft);
        Ok(())
    }

    /// Seed the extended-type record. Must match the asset's extended config.
    pub fn set_type_record(&mut self, record: TypeRecord) -> Result<()> {
        extended::validate_record(self.new_asset, &record)?;
        self.config.type_record = Some(record);
        Ok(())
    }

    /// Seed the property record. Fully typed, so nothing to validate beyond
    /// the type system.
    pub fn set_properties(&mut self, properties: ItemProperties) {
        self.config.properties = Some(properties);
    }

    /// Add to the difficulty modifier applied after the difficulty stage.
    pub fn set_difficulty_modifier(&mut self, modifier: i32) {
        self.config.difficulty_modifier = modifier;
    }

    pub(crate) fn into_config(self) -> ItemConfig {
        self.config
    }
}

impl StageEvent for ItemConfigEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "oldItem": item_name(self.old_item),
            "newAsset": self.new_asset.name,
            "lock": self.lock.map(LockFlag::lock_name),
            "color": self.config.color,
            "typeRecord": self.config.type_record,
            "difficultyModifier": self.config.difficulty_modifier,
        })
    }
}

/// Color stage event: the pending per-layer colors as they stand.
pub struct ColorEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub old_item: Option<&'a Item>,
    pub new_asset: &'a Arc<Asset>,
    pub color: &'a [String],
}

impl StageEvent for ColorEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "newAsset": self.new_asset.name,
            "color": self.color,
        })
    }
}

/// Type-record stage event: the record as it stands after creation.
pub struct TypeRecordEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub new_asset: &'a Arc<Asset>,
    pub record: Option<&'a TypeRecord>,
}

impl StageEvent for TypeRecordEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "newAsset": self.new_asset.name,
            "typeRecord": self.record,
        })
    }
}

/// Property stage event: the property record as it stands.
pub struct PropertyEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub new_asset: &'a Arc<Asset>,
    pub properties: &'a ItemProperties,
}

impl StageEvent for PropertyEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "newAsset": self.new_asset.name,
            "properties": self.properties,
        })
    }
}

/// Craft stage event: the craft record as it stands, if any.
pub struct CraftEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub new_asset: &'a Arc<Asset>,
    pub craft: Option<&'a Craft>,
}

impl StageEvent for CraftEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "newAsset": self.new_asset.name,
            "craft": self.craft.map(|c| c.name.as_str()),
        })
    }
}

/// Difficulty stage event.
pub struct DifficultyEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub new_asset: &'a Arc<Asset>,
    pub difficulty_modifier: i32,
}

impl StageEvent for DifficultyEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "newAsset": self.new_asset.name,
            "difficultyModifier": self.difficulty_modifier,
        })
    }
}

/// Event fired once an item is fully configured.
pub struct ItemDoneEvent<'a> {
    pub outfit: &'a str,
    pub character: &'a Character,
    pub item: &'a Item,
}

impl StageEvent for ItemDoneEvent<'_> {
    fn log_value(&self) -> Value {
        json!({
            "outfit": self.outfit,
            "character": self.character.name,
            "item": self.item.asset.name,
        })
    }
}

macro_rules! stages {
    ($($(#[$doc:meta])* $marker:ident, $name:literal, $event:ident, $output:ty;)+) => {
        $(
            $(#[$doc])*
            pub enum $marker {}

            impl Stage for $marker {
                const NAME: &'static str = $name;
                type Event<'a> = $event<'a>;
                type Output = $output;
            }
        )+
    };
}

stages! {
    /// Observational; fired once before any mutation.
    BeforeOutfitEquip, "before-outfit-equip", OutfitEvent, ();
    /// First non-empty reason fails the group's item; all outputs collected.
    ValidateUnequip, "validate-item-unequip", UnequipEvent, Option<String>;
    /// Prerequisite-style validation of surviving targets.
    ValidateEquip, "validate-item-equip", EquipCheckEvent, Option<String>;
    /// Mutable pre-commit configuration; a setter error fails the item.
    BeforeItemEquip, "before-item-equip", ItemConfigEvent, eyre::Result<()>;
    /// Full or partial layer proposals, merged index-wise, later wins.
    ColorStage, "color", ColorEvent, Option<Vec<Option<String>>>;
    /// Keyed merges into the created item's type record.
    TypeRecordStage, "type-record", TypeRecordEvent, Option<TypeRecord>;
    /// Defined-field merges into the created item's property record.
    PropertyStage, "property", PropertyEvent, Option<ItemProperties>;
    /// Craft overrides; only runs for craft-eligible assets.
    CraftStage, "craft", CraftEvent, Option<CraftOverride>;
    /// Numeric modifiers, summed onto the item's difficulty.
    DifficultyStage, "difficulty", DifficultyEvent, i32;
    /// Observational; fired per fully-configured item.
    AfterItemEquip, "after-item-equip", ItemDoneEvent, ();
    /// Observational; fired once after the whole batch.
    AfterOutfitEquip, "after-outfit-equip", OutfitEvent, ();
}

/// A registered listener plus its metadata.
pub struct Hook<S: Stage> {
    pub meta: HookMeta,
    listener: Box<dyn for<'a> Fn(&mut S::Event<'a>, &Kwargs) -> S::Output>,
}

impl<S: Stage> Hook<S> {
    /// Decide whether this hook runs for the given active set, and with what
    /// kwargs. `Err` carries the skip reason.
    fn activation(&self, active: &ActiveHooks) -> std::result::Result<Kwargs, String> {
        let kwargs = active.get(&self.meta.id.key()).cloned();
        if self.meta.conditional && kwargs.is_none() {
            return Err("not in the active set".into());
        }
        let kwargs = kwargs.unwrap_or_default();
        for spec in &self.meta.kwargs {
            if spec.required && !kwargs.contains_key(&spec.name) {
                return Err(format!("missing required kwarg {:?}", spec.name));
            }
        }
        Ok(kwargs)
    }
}

/// Gives the registry a hook list per stage type.
pub trait HoldsStage<S: Stage> {
    fn hooks(&self) -> &[Hook<S>];
    fn hooks_mut(&mut self) -> &mut Vec<Hook<S>>;
}

/// The per-stage hook lists. One registry serves a whole session.
#[derive(Default)]
pub struct HookRegistry {
    before_outfit: Vec<Hook<BeforeOutfitEquip>>,
    validate_unequip: Vec<Hook<ValidateUnequip>>,
    validate_equip: Vec<Hook<ValidateEquip>>,
    before_item: Vec<Hook<BeforeItemEquip>>,
    color: Vec<Hook<ColorStage>>,
    type_record: Vec<Hook<TypeRecordStage>>,
    property: Vec<Hook<PropertyStage>>,
    craft: Vec<Hook<CraftStage>>,
    difficulty: Vec<Hook<DifficultyStage>>,
    after_item: Vec<Hook<AfterItemEquip>>,
    after_outfit: Vec<Hook<AfterOutfitEquip>>,
}

macro_rules! holds_stage {
    ($($stage:ty => $field:ident,)+) => {
        $(impl HoldsStage<$stage> for HookRegistry {
            fn hooks(&self) -> &[Hook<$stage>] {
                &self.$field
            }

            fn hooks_mut(&mut self) -> &mut Vec<Hook<$stage>> {
                &mut self.$field
            }
        })+
    };
}

holds_stage! {
    BeforeOutfitEquip => before_outfit,
    ValidateUnequip => validate_unequip,
    ValidateEquip => validate_equip,
    BeforeItemEquip => before_item,
    ColorStage => color,
    TypeRecordStage => type_record,
    PropertyStage => property,
    CraftStage => craft,
    DifficultyStage => difficulty,
    AfterItemEquip => after_item,
    AfterOutfitEquip => after_outfit,
}

impl HookRegistry {
    /// Register a listener for stage `S`. Re-registering an id replaces the
    /// existing hook in place, keeping its position in the run order.
    pub fn register<S, F>(&mut self, meta: HookMeta, listener: F)
    where
        S: Stage,
        Self: HoldsStage<S>,
        F: for<'a> Fn(&mut S::Event<'a>, &Kwargs) -> S::Output + 'static,
    {
        let hook = Hook::<S> {
            meta,
            listener: Box::new(listener),
        };
        let hooks = HoldsStage::<S>::hooks_mut(self);
        match hooks.iter_mut().find(|h| h.meta.id == hook.meta.id) {
            Some(existing) => {
                log::warn!("Replacing hook {} on {:?}", hook.meta.id, S::NAME);
                *existing = hook;
            }
            None => hooks.push(hook),
        }
    }

    /// Run every activated hook of stage `S` against `event`, in
    /// registration order, collecting their outputs.
    pub fn run<S>(
        &self,
        event: &mut S::Event<'_>,
        active: &ActiveHooks,
        log: &mut EquipLog,
    ) -> Vec<S::Output>
    where
        S: Stage,
        Self: HoldsStage<S>,
    {
        let mut outputs = Vec::new();
        for hook in HoldsStage::<S>::hooks(self) {
            match hook.activation(active) {
                Ok(kwargs) => {
                    outputs.push((hook.listener)(event, &kwargs));
                    log.entries.push(LogEntry {
                        stage: S::NAME,
                        hook: Some(hook.meta.id.key()),
                        group: None,
                        disposition: Disposition::Ran,
                        event: Some(event.log_value()),
                        kwargs,
                    });
                }
                Err(reason) => {
                    log.entries.push(LogEntry {
                        stage: S::NAME,
                        hook: Some(hook.meta.id.key()),
                        group: None,
                        disposition: Disposition::Skipped(reason),
                        event: None,
                        kwargs: Kwargs::new(),
                    });
                }
            }
        }
        outputs
    }

    pub fn hook_count<S>(&self) -> usize
    where
        S: Stage,
        Self: HoldsStage<S>,
    {
        HoldsStage::<S>::hooks(self).len()
    }
}
