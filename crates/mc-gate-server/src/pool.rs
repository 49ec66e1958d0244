//! Fixed-size table of connection slots.
//!
//! The table holds `2 × max_players` slots and never grows. A slot is empty,
//! active, or holds a closed connection whose tunnels are still winding down.
//! Only [`ConnectionPool::release`] empties a slot, so a slot is never handed
//! out while an earlier occupant's tasks may hold sockets. New occupants are fully constructed before being published under the write
//! lock, so readers see either the old or the new connection.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::connection::{Connection, ConnectionId, Outgoing, Position};
use crate::error::PoolError;

#[derive(Default)]
struct Slot {
    generation: u64,
    occupant: Option<Arc<Connection>>,
}

impl Slot {
    fn is_free(&self) -> bool {
        self.occupant.is_none()
    }

    fn active(&self) -> Option<&Arc<Connection>> {
        self.occupant.as_ref().filter(|c| !c.is_closed())
    }
}

pub struct ConnectionPool {
    slots: RwLock<Vec<Slot>>,
}

impl ConnectionPool {
    pub fn new(max_players: u32) -> Self {
        let capacity = 2 * max_players as usize;
        Self {
            slots: RwLock::new((0..capacity).map(|_| Slot::default()).collect()),
        }
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.slots.read().len()
    }

    /// Place a new connection in the first empty slot.
    pub fn acquire(
        &self,
        addr: SocketAddr,
        robot: bool,
    ) -> Result<(Arc<Connection>, mpsc::UnboundedReceiver<Outgoing>), PoolError> {
        let mut slots = self.slots.write();
        let capacity = slots.len();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_free())
            .ok_or(PoolError::Exhausted(capacity))?;
        slot.generation += 1;
        let id = ConnectionId {
            slot: index,
            generation: slot.generation,
        };
        let (connection, outbox) = Connection::new(id, addr, robot);
        let connection = Arc::new(connection);
        slot.occupant = Some(connection.clone());
        Ok((connection, outbox))
    }

    /// Close `connection` and empty its slot for reuse. Safe to call any
    /// number of times; a stale handle never evicts a newer occupant.
    /// Returns true only for the call that emptied the slot.
    pub fn release(&self, connection: &Connection) -> bool {
        connection.close();
        let id = connection.id();
        let mut slots = self.slots.write();
        match slots.get_mut(id.slot) {
            Some(slot) if slot.occupant.as_ref().is_some_and(|c| c.id() == id) => {
                slot.occupant = None;
                true
            }
            _ => false,
        }
    }

    /// Active connections in slot order.
    pub fn iter(&self) -> ActiveConnections<'_> {
        ActiveConnections {
            pool: self,
            cursor: 0,
        }
    }

    pub fn active_count(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| s.active().is_some())
            .count()
    }

    /// Active connection whose name matches, ignoring case.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Connection>> {
        self.iter().find(|c| c.has_name(name))
    }

    /// Names of logged-in players, robots excluded.
    pub fn online_names(&self) -> Vec<String> {
        self.iter()
            .filter(|c| !c.is_robot())
            .filter_map(|c| c.name())
            .collect()
    }

    /// Number of connections that finished login.
    pub fn online_count(&self) -> usize {
        self.iter().filter(|c| c.name().is_some()).count()
    }

    /// Logged-in connections within `radius` blocks of `center`.
    pub fn nearby(&self, center: &Position, radius: f64) -> Vec<Arc<Connection>> {
        let radius_sq = radius * radius;
        self.iter()
            .filter(|c| c.name().is_some())
            .filter(|c| {
                c.position()
                    .is_some_and(|p| p.distance_squared(center) <= radius_sq)
            })
            .collect()
    }
}

/// Cursor over the slot table. Each step takes the read lock briefly, so
/// slots may change between steps but never mid-read.
pub struct ActiveConnections<'a> {
    pool: &'a ConnectionPool,
    cursor: usize,
}

impl Iterator for ActiveConnections<'_> {
    type Item = Arc<Connection>;

    fn next(&mut self) -> Option<Self::Item> {
        let slots = self.pool.slots.read();
        while self.cursor < slots.len() {
            let slot = &slots[self.cursor];
            self.cursor += 1;
            if let Some(connection) = slot.active() {
                return Some(connection.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn capacity_is_twice_max_players() {
        let pool = ConnectionPool::new(3);
        assert_eq!(pool.capacity(), 6);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn pool_is_bounded_and_reuses_released_slot() {
        let pool = ConnectionPool::new(2);
        let mut held = Vec::new();
        for port in 0..4 {
            held.push(pool.acquire(addr(port), false).unwrap());
        }
        assert!(matches!(
            pool.acquire(addr(99), false),
            Err(PoolError::Exhausted(4))
        ));

        let (victim, _) = &held[2];
        assert!(pool.release(victim));
        let (reused, _) = pool.acquire(addr(100), false).unwrap();
        assert_eq!(reused.id().slot, 2);
        assert_eq!(reused.id().generation, 2);
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn release_twice_is_harmless() {
        let pool = ConnectionPool::new(1);
        let (first, _rx) = pool.acquire(addr(1), false).unwrap();
        assert!(pool.release(&first));
        let (second, _rx2) = pool.acquire(addr(2), false).unwrap();
        assert_eq!(second.id().slot, 0);

        // A stale handle cannot touch the new occupant.
        assert!(!pool.release(&first));
        assert!(!second.is_closed());
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn closed_slot_waits_for_release() {
        let pool = ConnectionPool::new(1);
        let (first, _rx1) = pool.acquire(addr(1), false).unwrap();
        let (_second, _rx2) = pool.acquire(addr(2), false).unwrap();
        assert!(first.close());
        assert_eq!(pool.active_count(), 1);
        assert!(matches!(
            pool.acquire(addr(3), false),
            Err(PoolError::Exhausted(2))
        ));

        assert!(pool.release(&first));
        let (third, _rx3) = pool.acquire(addr(3), false).unwrap();
        assert_eq!(third.id().slot, 0);
    }

    #[test]
    fn first_free_slot_wins() {
        let pool = ConnectionPool::new(2);
        let (a, _) = pool.acquire(addr(1), false).unwrap();
        let (b, _) = pool.acquire(addr(2), false).unwrap();
        let (_c, _) = pool.acquire(addr(3), false).unwrap();
        pool.release(&b);
        pool.release(&a);
        let (next, _) = pool.acquire(addr(4), false).unwrap();
        assert_eq!(next.id().slot, 0);
    }

    #[test]
    fn iteration_skips_closed_and_empty() {
        let pool = ConnectionPool::new(3);
        let (a, _) = pool.acquire(addr(1), false).unwrap();
        let (b, _) = pool.acquire(addr(2), false).unwrap();
        let (c, _) = pool.acquire(addr(3), true).unwrap();
        a.set_identity("Alice", 0);
        b.set_identity("Bob", 0);
        c.set_identity("Robot", 0);
        pool.release(&b);

        let ids: Vec<usize> = pool.iter().map(|c| c.id().slot).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(pool.online_names(), vec!["Alice".to_string()]);
        assert_eq!(pool.online_count(), 2);
        assert!(pool.find_by_name("alice").is_some());
        assert!(pool.find_by_name("Bob").is_none());
    }

    #[test]
    fn nearby_uses_radius() {
        let pool = ConnectionPool::new(2);
        let (a, _) = pool.acquire(addr(1), false).unwrap();
        let (b, _) = pool.acquire(addr(2), false).unwrap();
        let (c, _) = pool.acquire(addr(3), false).unwrap();
        for (conn, name, x) in [(&a, "A", 0.0), (&b, "B", 10.0), (&c, "C", 100.0)] {
            conn.set_identity(name, 0);
            conn.set_position(Position {
                x,
                y: 64.0,
                z: 0.0,
                stance: 65.6,
            });
        }
        let center = a.position().unwrap();
        let names: Vec<String> = pool
            .nearby(&center, 20.0)
            .iter()
            .filter_map(|c| c.name())
            .collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }
}
