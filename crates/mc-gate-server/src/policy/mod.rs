//! Policy collaborators consulted by the packet dispatcher.
//!
//! Each concern is a trait so the dispatcher only sees the questions it asks;
//! the JSON-backed tables in the submodules are the production answers.

pub mod access;
pub mod chests;
pub mod store;
pub mod tables;

use std::sync::Arc;

use mc_gate_proto::types::BlockPos;

use crate::config::GateConfig;
use access::AccessList;
use chests::ChestLockTable;
use tables::{FirewallTable, ItemWatchTable, MuteSet, RankTable};

pub trait ChestLocks: Send + Sync {
    fn has_lock(&self, pos: BlockPos) -> bool;
    fn owns_lock(&self, name: &str, pos: BlockPos) -> bool;
    /// Returns false if the block is already locked.
    fn create_lock(&self, name: &str, pos: BlockPos, is_group: bool) -> bool;
}

pub trait BlockFirewall: Send + Sync {
    fn is_watched(&self, block_id: i16) -> bool;
    fn is_allowed(&self, rank: i32, block_id: i16) -> bool;
}

pub trait ItemWatch: Send + Sync {
    fn is_watched(&self, item_id: i16) -> bool;
    fn is_allowed(&self, rank: i32, item_id: i16, count: i32) -> bool;
}

pub trait MuteList: Send + Sync {
    fn is_muted(&self, name: &str) -> bool;
    /// Returns false if the player was already muted.
    fn mute(&self, name: &str) -> bool;
    /// Returns false if the player was not muted.
    fn unmute(&self, name: &str) -> bool;
}

pub trait RankResolver: Send + Sync {
    /// Rank of a player; negative means guest.
    fn rank_of(&self, name: &str) -> i32;
}

/// The full set of collaborators shared by every connection.
pub struct Policy {
    pub locks: Arc<dyn ChestLocks>,
    pub firewall: Arc<dyn BlockFirewall>,
    pub items: Arc<dyn ItemWatch>,
    pub mutes: Arc<dyn MuteList>,
    pub ranks: Arc<dyn RankResolver>,
    pub access: AccessList,
}

impl Policy {
    /// Load every table from the configured data directory.
    pub fn load(config: &GateConfig) -> Self {
        let data = &config.data;
        Self {
            locks: Arc::new(ChestLockTable::load(data.path("chests.json"))),
            firewall: Arc::new(FirewallTable::load(data.path("block-firewall.json"))),
            items: Arc::new(ItemWatchTable::load(data.path("item-watch.json"))),
            mutes: Arc::new(MuteSet::load(data.path("mutes.json"))),
            ranks: Arc::new(RankTable::load(
                data.path("members.json"),
                config.permissions.default_rank,
            )),
            access: AccessList::load(data, config.permissions.whitelist_enabled),
        }
    }

    /// Empty tables that never touch the disk.
    #[cfg(test)]
    pub fn in_memory(config: &GateConfig) -> Self {
        Self {
            locks: Arc::new(ChestLockTable::in_memory()),
            firewall: Arc::new(FirewallTable::from_rules([])),
            items: Arc::new(ItemWatchTable::from_rules([])),
            mutes: Arc::new(MuteSet::in_memory()),
            ranks: Arc::new(RankTable::from_entries(
                [],
                config.permissions.default_rank,
            )),
            access: AccessList::in_memory(&[], config.permissions.whitelist_enabled),
        }
    }
}
