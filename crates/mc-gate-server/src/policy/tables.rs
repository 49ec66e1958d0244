//! Read-mostly lookup tables: ranks, mutes, the block firewall and the
//! item watch list.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Deserialize;

use super::store::{load_json, name_key, JsonFile};
use super::{BlockFirewall, ItemWatch, MuteList, RankResolver};

/// `members.json`: player name to rank.
pub struct RankTable {
    ranks: HashMap<String, i32>,
    default_rank: i32,
}

impl RankTable {
    pub fn load(path: PathBuf, default_rank: i32) -> Self {
        let ranks: HashMap<String, i32> = load_json(&path);
        Self::from_entries(ranks, default_rank)
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, i32)>,
        default_rank: i32,
    ) -> Self {
        Self {
            ranks: entries
                .into_iter()
                .map(|(name, rank)| (name_key(&name), rank))
                .collect(),
            default_rank,
        }
    }
}

impl RankResolver for RankTable {
    fn rank_of(&self, name: &str) -> i32 {
        self.ranks
            .get(&name_key(name))
            .copied()
            .unwrap_or(self.default_rank)
    }
}

/// `mutes.json`: muted player names.
pub struct MuteSet {
    names: RwLock<HashSet<String>>,
    file: Option<JsonFile>,
}

impl MuteSet {
    pub fn load(path: PathBuf) -> Self {
        let names: Vec<String> = load_json(&path);
        Self {
            names: RwLock::new(names.iter().map(|n| name_key(n)).collect()),
            file: Some(JsonFile::new(path)),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            names: RwLock::new(HashSet::new()),
            file: None,
        }
    }

    /// Persist the set; consumes the write guard so the file is written
    /// after the lock is released.
    fn save(&self, names: RwLockWriteGuard<'_, HashSet<String>>) {
        let Some(file) = &self.file else {
            return;
        };
        let ticket = file.ticket();
        let mut sorted: Vec<String> = names.iter().cloned().collect();
        drop(names);
        sorted.sort();
        file.save(ticket, sorted);
    }
}

impl MuteList for MuteSet {
    fn is_muted(&self, name: &str) -> bool {
        self.names.read().contains(&name_key(name))
    }

    fn mute(&self, name: &str) -> bool {
        let mut names = self.names.write();
        let added = names.insert(name_key(name));
        if added {
            self.save(names);
        }
        added
    }

    fn unmute(&self, name: &str) -> bool {
        let mut names = self.names.write();
        let removed = names.remove(&name_key(name));
        if removed {
            self.save(names);
        }
        removed
    }
}

#[derive(Debug, Deserialize)]
struct FirewallRule {
    block: i16,
    rank: i32,
}

/// `block-firewall.json`: blocks that need a minimum rank to place.
pub struct FirewallTable {
    required: HashMap<i16, i32>,
}

impl FirewallTable {
    pub fn load(path: PathBuf) -> Self {
        let rules: Vec<FirewallRule> = load_json(&path);
        Self::from_rules(rules.into_iter().map(|r| (r.block, r.rank)))
    }

    /// `(block id, required rank)` pairs.
    pub fn from_rules(rules: impl IntoIterator<Item = (i16, i32)>) -> Self {
        Self {
            required: rules.into_iter().collect(),
        }
    }
}

impl BlockFirewall for FirewallTable {
    fn is_watched(&self, block_id: i16) -> bool {
        self.required.contains_key(&block_id)
    }

    fn is_allowed(&self, rank: i32, block_id: i16) -> bool {
        self.required
            .get(&block_id)
            .is_none_or(|&required| rank >= required)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WatchRule {
    pub item: i16,
    /// Largest stack a player below `rank` may move at once.
    pub threshold: i32,
    pub rank: i32,
}

/// `item-watch.json`: items that may not be handled in bulk below a rank.
pub struct ItemWatchTable {
    rules: HashMap<i16, WatchRule>,
}

impl ItemWatchTable {
    pub fn load(path: PathBuf) -> Self {
        let rules: Vec<WatchRule> = load_json(&path);
        Self::from_rules(rules)
    }

    pub fn from_rules(rules: impl IntoIterator<Item = WatchRule>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.item, r)).collect(),
        }
    }
}

impl ItemWatch for ItemWatchTable {
    fn is_watched(&self, item_id: i16) -> bool {
        self.rules.contains_key(&item_id)
    }

    fn is_allowed(&self, rank: i32, item_id: i16, count: i32) -> bool {
        self.rules
            .get(&item_id)
            .is_none_or(|rule| count <= rule.threshold || rank >= rule.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::store::testing::TempDir;

    #[test]
    fn unknown_players_get_default_rank() {
        let ranks = RankTable::from_entries([("Steve".to_string(), 3)], 0);
        assert_eq!(ranks.rank_of("steve"), 3);
        assert_eq!(ranks.rank_of("Alex"), 0);

        let guests = RankTable::from_entries([], -1);
        assert_eq!(guests.rank_of("Alex"), -1);
    }

    #[test]
    fn members_file() {
        let dir = TempDir::new("members");
        let path = dir.file("members.json");
        std::fs::write(&path, r#"{"Notch": 5, "jeb_": 2}"#).unwrap();
        let ranks = RankTable::load(path, 0);
        assert_eq!(ranks.rank_of("notch"), 5);
        assert_eq!(ranks.rank_of("JEB_"), 2);
    }

    #[test]
    fn mute_and_unmute_persist() {
        let dir = TempDir::new("mutes");
        let path = dir.file("mutes.json");
        let mutes = MuteSet::load(path.clone());
        assert!(mutes.mute("Spammer"));
        assert!(!mutes.mute("spammer"));
        assert!(MuteSet::load(path.clone()).is_muted("SPAMMER"));

        assert!(mutes.unmute("Spammer"));
        assert!(!mutes.unmute("Spammer"));
        assert!(!MuteSet::load(path).is_muted("Spammer"));
    }

    #[test]
    fn firewall_requires_rank() {
        let firewall = FirewallTable::from_rules([(46, 2)]);
        assert!(firewall.is_watched(46));
        assert!(!firewall.is_watched(1));
        assert!(!firewall.is_allowed(1, 46));
        assert!(firewall.is_allowed(2, 46));
        assert!(firewall.is_allowed(0, 1));
    }

    #[test]
    fn item_watch_threshold() {
        let watch = ItemWatchTable::from_rules([WatchRule {
            item: 264,
            threshold: 50,
            rank: 2,
        }]);
        assert!(watch.is_watched(264));
        assert!(watch.is_allowed(1, 264, 50));
        assert!(!watch.is_allowed(1, 264, 64));
        assert!(watch.is_allowed(2, 264, 64));
        assert!(watch.is_allowed(3, 264, 64));
        assert!(watch.is_allowed(0, 1, 64));
    }

    #[test]
    fn item_watch_file() {
        let dir = TempDir::new("item_watch");
        let path = dir.file("item-watch.json");
        std::fs::write(&path, r#"[{"item": 46, "threshold": 10, "rank": 4}]"#).unwrap();
        let watch = ItemWatchTable::load(path);
        assert!(!watch.is_allowed(3, 46, 11));
        assert!(watch.is_allowed(4, 46, 11));
    }
}
