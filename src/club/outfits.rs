//! Saved outfits, organized as a directory tree addressed by `/`-separated
//! paths. Segment names follow the windows filename convention.

use std::collections::BTreeMap;

use eyre::{bail, ensure, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::club::wheel::WheelItem;

pub const FILE_SEP: char = '/';

lazy_static! {
    /// Valid path segment: no control characters, none of `><:"/\|?*`.
    pub static ref FILE_SEGMENT: Regex = Regex::new(r#"^[^\p{Cc}><:"/\\|?*]+$"#).unwrap();
}

/// Split a path on `/`, dropping empty segments and rejecting invalid ones.
pub fn parse_path(path: &str) -> Result<Vec<String>> {
    let mut segments = Vec::new();
    for segment in path.split(FILE_SEP) {
        if segment.is_empty() {
            continue;
        }
        ensure!(
            FILE_SEGMENT.is_match(segment),
            "Bad outfit path segment {segment:?}"
        );
        segments.push(segment.to_string());
    }
    Ok(segments)
}

/// One saved outfit: at most one item per group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outfit {
    pub id: u64,
    pub name: String,
    pub items: BTreeMap<String, WheelItem>,
}

impl Outfit {
    /// Flatten to the list shape the equip pipeline takes.
    pub fn wheel_items(&self) -> Vec<WheelItem> {
        self.items.values().cloned().collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub directories: BTreeMap<String, Directory>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outfits: BTreeMap<String, Outfit>,
}

impl Directory {
    fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.outfits.is_empty()
    }
}

/// The saved-outfit tree plus the id counter for new entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutfitCollection {
    #[serde(default)]
    pub root: Directory,
    #[serde(default)]
    next_id: u64,
}

impl OutfitCollection {
    fn dir(&self, segments: &[String]) -> Option<&Directory> {
        let mut dir = &self.root;
        for segment in segments {
            dir = dir.directories.get(segment)?;
        }
        Some(dir)
    }

    fn dir_mut(&mut self, segments: &[String], create: bool) -> Option<&mut Directory> {
        let mut dir = &mut self.root;
        for segment in segments {
            dir = if create {
                dir.directories.entry(segment.clone()).or_default()
            } else {
                dir.directories.get_mut(segment)?
            };
        }
        Some(dir)
    }

    /// Save `items` under `path`, creating intermediate directories. The
    /// last segment names the outfit. Saving over an existing name replaces
    /// its items but keeps its id.
    pub fn insert(&mut self, path: &str, items: BTreeMap<String, WheelItem>) -> Result<u64> {
        let mut segments = parse_path(path)?;
        let Some(name) = segments.pop() else {
            bail!("Empty outfit path");
        };
        let fresh_id = self.next_id;
        let dir = match self.dir_mut(&segments, true) {
            Some(dir) => dir,
            None => bail!("Unreachable outfit path {path:?}"),
        };
        let outfit = dir.outfits.entry(name.clone()).or_insert_with(|| Outfit {
            id: fresh_id,
            name,
            items: BTreeMap::new(),
        });
        outfit.items = items;
        let id = outfit.id;
        // Existing entries always carry an older id.
        if id == fresh_id {
            self.next_id += 1;
        }
        Ok(id)
    }

    pub fn get(&self, path: &str) -> Option<&Outfit> {
        let mut segments = parse_path(path).ok()?;
        let name = segments.pop()?;
        self.dir(&segments)?.outfits.get(&name)
    }

    pub fn remove(&mut self, path: &str) -> Option<Outfit> {
        let mut segments = parse_path(path).ok()?;
        let name = segments.pop()?;
        let removed = self.dir_mut(&segments, false)?.outfits.remove(&name)?;
        self.prune(&segments);
        Some(removed)
    }

    // Drop now-empty directories along `segments`, deepest first.
    fn prune(&mut self, segments: &[String]) {
        for depth in (1..=segments.len()).rev() {
            let empty = self
                .dir(&segments[..depth])
                .map(Directory::is_empty)
                .unwrap_or(false);
            if !empty {
                break;
            }
            if let Some(parent) = self.dir_mut(&segments[..depth - 1], false) {
                parent.directories.remove(&segments[depth - 1]);
            }
        }
    }

    /// Move an outfit to a new path, keeping its id and items. The new name
    /// is the target path's last segment.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut target = parse_path(to)?;
        let Some(new_name) = target.pop() else {
            bail!("Empty outfit path");
        };
        ensure!(
            self.get(to).is_none(),
            "An outfit named {to:?} already exists"
        );
        let mut outfit = match self.remove(from) {
            Some(outfit) => outfit,
            None => bail!("No outfit at {from:?}"),
        };
        outfit.name = new_name.clone();
        let dir = match self.dir_mut(&target, true) {
            Some(dir) => dir,
            None => bail!("Unreachable outfit path {to:?}"),
        };
        dir.outfits.insert(new_name, outfit);
        Ok(())
    }

    /// Every outfit with its full path, depth first, lexicographic within
    /// each directory.
    pub fn entries(&self) -> Vec<(String, &Outfit)> {
        fn walk<'a>(dir: &'a Directory, prefix: &str, out: &mut Vec<(String, &'a Outfit)>) {
            for (name, outfit) in &dir.outfits {
                out.push((format!("{prefix}{name}"), outfit));
            }
            for (name, child) in &dir.directories {
                walk(child, &format!("{prefix}{name}{FILE_SEP}"), out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}
