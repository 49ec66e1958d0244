//! Chest locks keyed by block coordinate, persisted to `chests.json`.

use std::collections::HashMap;
use std::path::PathBuf;

use mc_gate_proto::types::BlockPos;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::store::{load_json, name_key, JsonFile};
use super::ChestLocks;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    owner: String,
    x: i32,
    y: i32,
    z: i32,
    #[serde(default)]
    group: bool,
}

#[derive(Debug, Clone)]
struct Lock {
    owner: String,
    group: bool,
}

pub struct ChestLockTable {
    locks: RwLock<HashMap<BlockPos, Lock>>,
    file: Option<JsonFile>,
}

impl ChestLockTable {
    pub fn load(path: PathBuf) -> Self {
        let records: Vec<LockRecord> = load_json(&path);
        let locks = records
            .into_iter()
            .map(|r| {
                (
                    BlockPos::new(r.x, r.y, r.z),
                    Lock {
                        owner: r.owner,
                        group: r.group,
                    },
                )
            })
            .collect();
        Self {
            locks: RwLock::new(locks),
            file: Some(JsonFile::new(path)),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            file: None,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    fn snapshot(locks: &HashMap<BlockPos, Lock>) -> Vec<LockRecord> {
        let mut records: Vec<LockRecord> = locks
            .iter()
            .map(|(pos, lock)| LockRecord {
                owner: lock.owner.clone(),
                x: pos.x,
                y: pos.y,
                z: pos.z,
                group: lock.group,
            })
            .collect();
        records.sort_by_key(|r| (r.x, r.y, r.z));
        records
    }
}

impl ChestLocks for ChestLockTable {
    fn has_lock(&self, pos: BlockPos) -> bool {
        self.locks.read().contains_key(&pos)
    }

    fn owns_lock(&self, name: &str, pos: BlockPos) -> bool {
        self.locks
            .read()
            .get(&pos)
            .is_some_and(|lock| name_key(&lock.owner) == name_key(name))
    }

    fn create_lock(&self, name: &str, pos: BlockPos, is_group: bool) -> bool {
        let mut locks = self.locks.write();
        if locks.contains_key(&pos) {
            return false;
        }
        locks.insert(
            pos,
            Lock {
                owner: name.to_string(),
                group: is_group,
            },
        );
        let pending = self
            .file
            .as_ref()
            .map(|file| (file, file.ticket(), Self::snapshot(&locks)));
        drop(locks);
        if let Some((file, ticket, records)) = pending {
            file.save(ticket, records);
        }
        true
    }
}
