//! Blocking-graph construction and the priority assignment that decides the
//! order items come off and go on. Groups that block nothing sort first;
//! enclosing items always sort last.

use std::collections::{BTreeMap, BTreeSet};

use eyre::{bail, Result};

use crate::club::extended;
use crate::club::model::{Character, Item, TypeRecord, ENCLOSE};
use crate::club::wheel::WheelItem;
use crate::host::Host;

/// The minimal item shape the sorter needs.
#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    pub group: String,
    pub name: String,
    pub type_record: Option<TypeRecord>,
}

impl SortItem {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> SortItem {
        SortItem {
            group: group.into(),
            name: name.into(),
            type_record: None,
        }
    }
}

impl From<&Item> for SortItem {
    fn from(item: &Item) -> SortItem {
        SortItem {
            group: item.asset.group.name.clone(),
            name: item.asset.name.clone(),
            type_record: item.type_record.clone(),
        }
    }
}

impl From<&WheelItem> for SortItem {
    fn from(item: &WheelItem) -> SortItem {
        SortItem {
            group: item.group.clone(),
            name: item.name.clone(),
            type_record: item.type_record.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// One group's entry in the blocking graph.
#[derive(Clone, Debug)]
pub struct Node {
    /// Groups this item renders unequippable, from the asset and from the
    /// baseline property of its type record.
    pub block: BTreeSet<String>,
    /// Whether the item came from the currently-worn set rather than the
    /// incoming one.
    pub superset: bool,
    pub priority: i32,
    /// True for a currently-worn item that transitively blocks a group the
    /// incoming set populates. Such items must come off first.
    pub blocks_subset: bool,
    state: Visit,
}

pub type SortGraph = BTreeMap<String, Node>;

/// Assign `priority` and `blocks_subset` to `group` and everything it
/// reaches. Absent references contribute priority -1 and no flag; a group
/// re-entered while still on the traversal stack is a cycle.
fn sort_dfs(graph: &mut SortGraph, group: &str) -> Result<(i32, bool)> {
    let (block, superset) = match graph.get_mut(group) {
        None => return Ok((-1, false)),
        Some(node) => match node.state {
            Visit::Done => return Ok((node.priority, node.blocks_subset)),
            Visit::Active => bail!("Cyclic blocking graph through group {group:?}"),
            Visit::New => {
                node.state = Visit::Active;
                (node.block.clone(), node.superset)
            }
        },
    };

    let mut deepest = 0;
    let mut reaches_incoming = false;
    for child in &block {
        let (priority, flagged) = sort_dfs(graph, child)?;
        deepest = deepest.max(priority);
        if let Some(child_node) = graph.get(child.as_str()) {
            if !child_node.superset || flagged {
                reaches_incoming = true;
            }
        }
    }

    let priority = if block.is_empty() { 0 } else { 1 + deepest };
    let blocks_subset = superset && reaches_incoming;
    if let Some(node) = graph.get_mut(group) {
        node.priority = priority;
        node.blocks_subset = blocks_subset;
        node.state = Visit::Done;
    }
    Ok((priority, blocks_subset))
}

/// Build the blocking graph for `items` (plus the optionally-worn `current`
/// set) and assign every node its sorting priority.
///
/// Only `Item`-category groups participate. The first item seen for a group
/// wins; `items` is processed before `current`, so incoming definitions win
/// group collisions. An unresolvable asset fails the whole call.
pub fn items_arg_sort(
    host: &dyn Host,
    character: &Character,
    items: &[SortItem],
    current: &[SortItem],
) -> Result<SortGraph> {
    let mut graph = SortGraph::new();
    for (list, superset) in [(items, false), (current, true)] {
        for item in list {
            if graph.contains_key(&item.group) {
                continue;
            }

            let Some(asset) = host.asset(&character.asset_family, &item.group, &item.name) else {
                bail!("Unknown asset: {}{}", item.group, item.name);
            };
            if !asset.group.is_item() {
                continue;
            }

            let property = extended::baseline_property(&asset, item.type_record.as_ref());
            let block: BTreeSet<String> = asset
                .block
                .iter()
                .chain(property.block.iter().flatten())
                .cloned()
                .collect();

            // Enclosing items outrank every other group so nothing is pulled
            // out from under them.
            let enclose = asset.has_effect(ENCLOSE) || property.has_effect(ENCLOSE);
            let node = if enclose {
                Node {
                    block,
                    superset,
                    priority: host.group_count(&character.asset_family) as i32,
                    blocks_subset: superset,
                    state: Visit::Done,
                }
            } else {
                Node {
                    block,
                    superset,
                    priority: 0,
                    blocks_subset: false,
                    state: Visit::New,
                }
            };
            graph.insert(item.group.clone(), node);
        }
    }

    let groups: Vec<String> = graph.keys().cloned().collect();
    for group in &groups {
        sort_dfs(&mut graph, group)?;
    }
    Ok(graph)
}

/// The currently-worn items that must come off before `new_items` can go on,
/// because they enclose or (transitively) block a group the new set needs.
pub fn block_superset<'a>(
    host: &dyn Host,
    character: &Character,
    new_items: &[SortItem],
    current: &'a [Item],
) -> Result<Vec<&'a Item>> {
    let worn: Vec<SortItem> = current.iter().map(SortItem::from).collect();
    let graph = items_arg_sort(host, character, new_items, &worn)?;
    Ok(current
        .iter()
        .filter(|item| {
            graph
                .get(item.group_name())
                .map_or(false, |node| node.blocks_subset)
        })
        .collect())
}

/// Sort a wheel item list by ascending blocking priority, so that blocked
/// groups precede their blockers. Equal priorities keep their input order;
/// groups outside the graph sort last.
pub fn sort_for_display(host: &dyn Host, items: &[WheelItem]) -> Result<Vec<WheelItem>> {
    let dummy = host.dummy_character();
    let simple: Vec<SortItem> = items.iter().map(SortItem::from).collect();
    let graph = items_arg_sort(host, &dummy, &simple, &[])?;

    let mut sorted = items.to_vec();
    sorted.sort_by_key(|item| graph.get(&item.group).map_or(i32::MAX, |node| node.priority));
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;

    fn items(graph: &SortGraph) -> Vec<(&str, i32, bool)> {
        graph
            .iter()
            .map(|(group, node)| (group.as_str(), node.priority, node.blocks_subset))
            .collect()
    }

    #[test]
    fn test_leaves_get_priority_zero() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [
            SortItem::new("ItemMouth", "HarnessBallGag"),
            SortItem::new("ItemHandheld", "Bell"),
        ];
        let graph = items_arg_sort(&host, &character, &list, &[]).unwrap();
        assert_eq!(
            items(&graph),
            vec![("ItemHandheld", 0, false), ("ItemMouth", 0, false)]
        );
    }

    #[test]
    fn test_chain_depth() {
        // Armbinder blocks ItemHands, LeatherMittens block ItemHandheld.
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [
            SortItem::new("ItemArms", "Armbinder"),
            SortItem::new("ItemHands", "LeatherMittens"),
            SortItem::new("ItemHandheld", "Bell"),
        ];
        let graph = items_arg_sort(&host, &character, &list, &[]).unwrap();
        assert_eq!(graph["ItemHandheld"].priority, 0);
        assert_eq!(graph["ItemHands"].priority, 1);
        assert_eq!(graph["ItemArms"].priority, 2);
    }

    #[test]
    fn test_blocking_an_absent_group_still_counts() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [SortItem::new("ItemNeck", "PostureCollar")];
        let graph = items_arg_sort(&host, &character, &list, &[]).unwrap();
        // ItemNeckAccessories is not in the graph, but the collar still
        // ranks above a leaf.
        assert_eq!(graph["ItemNeck"].priority, 1);
    }

    #[test]
    fn test_enclose_takes_maximum_priority() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [
            SortItem::new("ItemDevices", "FuturisticCrate"),
            SortItem::new("ItemArms", "Armbinder"),
        ];
        let graph = items_arg_sort(&host, &character, &list, &[]).unwrap();
        let max = host.group_count(&character.asset_family) as i32;
        assert_eq!(graph["ItemDevices"].priority, max);
        assert!(!graph["ItemDevices"].blocks_subset);
    }

    #[test]
    fn test_type_record_can_contribute_enclose() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);

        let mut hood = SortItem::new("ItemHood", "ExtremeHood");
        hood.type_record = Some(TypeRecord::from([("typed".into(), 1)]));
        let graph = items_arg_sort(&host, &character, &[hood], &[]).unwrap();
        let max = host.group_count(&character.asset_family) as i32;
        assert_eq!(graph["ItemHood"].priority, max);

        let plain = SortItem::new("ItemHood", "ExtremeHood");
        let graph = items_arg_sort(&host, &character, &[plain], &[]).unwrap();
        assert_eq!(graph["ItemHood"].priority, 0);
    }

    #[test]
    fn test_first_definition_of_a_group_wins() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [
            SortItem::new("ItemNeck", "PostureCollar"),
            SortItem::new("ItemNeck", "LeatherCollar"),
        ];
        let graph = items_arg_sort(&host, &character, &list, &[]).unwrap();
        // The posture collar's block list survives, so the duplicate entry
        // was ignored.
        assert!(graph["ItemNeck"].block.contains("ItemNeckAccessories"));
    }

    #[test]
    fn test_appearance_groups_are_skipped() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [
            SortItem::new("Cloth", "TShirt"),
            SortItem::new("ItemMouth", "HarnessBallGag"),
        ];
        let graph = items_arg_sort(&host, &character, &list, &[]).unwrap();
        assert!(!graph.contains_key("Cloth"));
        assert!(graph.contains_key("ItemMouth"));
    }

    #[test]
    fn test_unknown_asset_is_fatal() {
        let host = LocalHost::standard();
        let character = host.character("Tess", 1234);
        let list = [SortItem::new("ItemArms", "NoSuchBinder")];
        let result = items_arg_sort(&host, &character, &list, &[]);
        assert!(result.unwrap_err().to_string().contains("Unknown asset"));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let mut host = LocalHost::standard();
        host.add_asset("ItemArms", "Ouroboros", |asset| {
            asset.block = vec!["ItemLegs".into()];
        });
        host.add_asset("ItemLegs", "Sorobouro", |asset| {
            asset.block = vec!["ItemArms".into()];
        });
        let character = host.character("Tess", 1234);
        let list = [
            SortItem::new("ItemArms", "Ouroboros"),
            SortItem::new("ItemLegs", "Sorobouro"),
        ];
        let result = items_arg_sort(&host, &character, &list, &[]);
        assert!(result.unwrap_err().to_string().contains("Cyclic"));
    }

    #[test]
    fn test_block_superset_flags_worn_blockers() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let binder = host
            .asset(&character.asset_family, "ItemArms", "Armbinder")
            .unwrap();
        let collar = host
            .asset(&character.asset_family, "ItemNeck", "LeatherCollar")
            .unwrap();
        host.create_item(&mut character, &binder, vec![], 0);
        host.create_item(&mut character, &collar, vec![], 0);

        let incoming = [SortItem::new("ItemHands", "LeatherMittens")];
        let worn = character.appearance.clone();
        let blockers = block_superset(&host, &character, &incoming, &worn).unwrap();
        let names: Vec<&str> = blockers.iter().map(|i| i.asset.name.as_str()).collect();
        // The armbinder blocks the incoming mittens; the collar blocks
        // nothing the new set needs.
        assert_eq!(names, vec!["Armbinder"]);
    }

    #[test]
    fn test_worn_enclose_blocks_everything_incoming() {
        let host = LocalHost::standard();
        let mut character = host.character("Tess", 1234);
        let crate_ = host
            .asset(&character.asset_family, "ItemDevices", "FuturisticCrate")
            .unwrap();
        host.create_item(&mut character, &crate_, vec![], 0);

        let incoming = [SortItem::new("ItemMouth", "HarnessBallGag")];
        let worn = character.appearance.clone();
        let blockers = block_superset(&host, &character, &incoming, &worn).unwrap();
        assert_eq!(blockers.len(), 1);
        assert_eq!(blockers[0].asset.name, "FuturisticCrate");
    }

    #[test]
    fn test_display_sort_puts_blocked_groups_first() {
        let host = LocalHost::standard();
        let list = [
            WheelItem::new("ItemNeck", "PostureCollar"),
            WheelItem::new("ItemNeckAccessories", "CollarAutoShockUnit"),
        ];
        let sorted = sort_for_display(&host, &list).unwrap();
        let groups: Vec<&str> = sorted.iter().map(|i| i.group.as_str()).collect();
        assert_eq!(groups, vec!["ItemNeckAccessories", "ItemNeck"]);
    }

    #[test]
    fn test_display_sort_is_stable_for_equal_priorities() {
        let host = LocalHost::standard();
        let list = [
            WheelItem::new("ItemMouth", "HarnessBallGag"),
            WheelItem::new("ItemHandheld", "Bell"),
            WheelItem::new("ItemFeet", "FuturisticAnkleCuffs"),
        ];
        let sorted = sort_for_display(&host, &list).unwrap();
        let groups: Vec<&str> = sorted.iter().map(|i| i.group.as_str()).collect();
        assert_eq!(groups, vec!["ItemMouth", "ItemHandheld", "ItemFeet"]);
    }
}
