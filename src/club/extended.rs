//! Extended-item type resolution. A type record picks one option per module
//! of an asset's extended config; the selected options' property records are
//! overlaid in module order to form the item's baseline property.

use eyre::{bail, Result};

use crate::club::model::{Asset, ItemProperties, TypeRecord};

/// Resolve the baseline property record for `asset` under `record`. Modules
/// absent from the record fall back to their first option. Unknown module
/// keys and out-of-range indices are ignored with a warning; a record on a
/// non-extended asset resolves to an empty baseline.
pub fn baseline_property(asset: &Asset, record: Option<&TypeRecord>) -> ItemProperties {
    let config = match &asset.extended {
        Some(config) => config,
        None => {
            if record.map_or(false, |r| !r.is_empty()) {
                log::warn!(
                    "Type record supplied for non-extended asset {:?}",
                    asset.name
                );
            }
            return ItemProperties::default();
        }
    };

    if let Some(record) = record {
        for key in record.keys() {
            if config.module(key).is_none() {
                log::warn!("Unknown module {:?} in type record for {:?}", key, asset.name);
            }
        }
    }

    let mut baseline = ItemProperties::default();
    for module in &config.modules {
        let index = record
            .and_then(|r| r.get(&module.key))
            .copied()
            .unwrap_or(0) as usize;
        let option = match module.options.get(index) {
            Some(option) => option,
            None => {
                log::warn!(
                    "Option {} out of range for module {:?} of {:?}",
                    index,
                    module.key,
                    asset.name
                );
                match module.options.first() {
                    Some(option) => option,
                    None => continue,
                }
            }
        };
        baseline.merge_defined(&option.property);
    }
    baseline
}

/// Check a type record against an asset's extended config. Used by the
/// mutable-event setter, where bad values must fail the item immediately.
pub fn validate_record(asset: &Asset, record: &TypeRecord) -> Result<()> {
    let config = match &asset.extended {
        Some(config) => config,
        None => bail!("asset {:?} takes no type record", asset.name),
    };
    for (key, index) in record {
        let module = match config.module(key) {
            Some(module) => module,
            None => bail!("asset {:?} has no module {:?}", asset.name, key),
        };
        if *index as usize >= module.options.len() {
            bail!(
                "option {} out of range for module {:?} of {:?} ({} options)",
                index,
                key,
                asset.name,
                module.options.len()
            );
        }
    }
    Ok(())
}
