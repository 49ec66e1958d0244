//! Who may connect: whitelist and ban lists.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::store::{load_json, name_key, JsonFile};
use crate::config::DataSection;

/// A ban entry with a reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub reason: String,
}

const WHITELIST_FILE: &str = "whitelist.json";
const BANNED_PLAYERS_FILE: &str = "banned-players.json";
const BANNED_IPS_FILE: &str = "banned-ips.json";

/// Whitelist plus name and IP bans. Names are matched case-insensitively.
pub struct AccessList {
    whitelist: HashSet<String>,
    whitelist_enabled: bool,
    banned_players: RwLock<HashMap<String, BanEntry>>,
    banned_ips: HashMap<String, BanEntry>,
    /// Where name bans are persisted; `None` keeps them in memory.
    banned_players_file: Option<JsonFile>,
}

impl AccessList {
    pub fn load(data: &DataSection, whitelist_enabled: bool) -> Self {
        let whitelist: Vec<String> = load_json(&data.path(WHITELIST_FILE));
        let banned_players: HashMap<String, BanEntry> =
            load_json(&data.path(BANNED_PLAYERS_FILE));
        Self {
            whitelist: whitelist.iter().map(|n| name_key(n)).collect(),
            whitelist_enabled,
            banned_players: RwLock::new(
                banned_players
                    .into_iter()
                    .map(|(name, entry)| (name_key(&name), entry))
                    .collect(),
            ),
            banned_ips: load_json(&data.path(BANNED_IPS_FILE)),
            banned_players_file: Some(JsonFile::new(data.path(BANNED_PLAYERS_FILE))),
        }
    }

    #[cfg(test)]
    pub fn in_memory(whitelist: &[&str], whitelist_enabled: bool) -> Self {
        Self {
            whitelist: whitelist.iter().map(|n| name_key(n)).collect(),
            whitelist_enabled,
            banned_players: RwLock::new(HashMap::new()),
            banned_ips: HashMap::new(),
            banned_players_file: None,
        }
    }

    pub fn name_ban(&self, name: &str) -> Option<BanEntry> {
        self.banned_players.read().get(&name_key(name)).cloned()
    }

    pub fn ip_ban(&self, ip: IpAddr) -> Option<BanEntry> {
        self.banned_ips.get(&ip.to_string()).cloned()
    }

    /// True unless the whitelist is enforced and `name` is missing from it.
    pub fn is_whitelisted(&self, name: &str) -> bool {
        !self.whitelist_enabled || self.whitelist.contains(&name_key(name))
    }

    pub fn ban_name(&self, name: &str, reason: &str) {
        let mut bans = self.banned_players.write();
        bans.insert(
            name_key(name),
            BanEntry {
                reason: reason.to_string(),
            },
        );
        let pending = self
            .banned_players_file
            .as_ref()
            .map(|file| (file, file.ticket(), bans.clone()));
        drop(bans);
        info!("Banned {name}: {reason}");
        if let Some((file, ticket, snapshot)) = pending {
            file.save(ticket, snapshot);
        }
    }
}
