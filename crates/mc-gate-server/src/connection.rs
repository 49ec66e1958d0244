//! Per-client state shared by the two tunnels of a connection.
//!
//! The inbound tunnel, command handlers and other connections all write
//! here; the outbound tunnel drains the outbox. Flags are atomics and the
//! few structured fields sit behind short `parking_lot` locks.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use mc_gate_command::GUEST_RANK;

/// Last known player position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub stance: f64,
}

impl Position {
    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Something the proxy itself wants the client to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Message(String),
    Kick(String),
}

/// Stable handle of a connection: pool slot plus reuse generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub slot: usize,
    pub generation: u64,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.slot, self.generation)
    }
}

pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    robot: bool,
    name: RwLock<Option<String>>,
    rank: AtomicI32,
    position: Mutex<Option<Position>>,
    god_mode: AtomicBool,
    attempting_lock: AtomicBool,
    flagged: AtomicBool,
    kicked: AtomicBool,
    kick_reason: Mutex<Option<String>>,
    closed: AtomicBool,
    outbox: mpsc::UnboundedSender<Outgoing>,
    close_tx: watch::Sender<bool>,
}

impl Connection {
    /// Create a connection and the receiving end of its outbox.
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        robot: bool,
    ) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let (close_tx, _) = watch::channel(false);
        let connection = Self {
            id,
            addr,
            robot,
            name: RwLock::new(None),
            rank: AtomicI32::new(GUEST_RANK),
            position: Mutex::new(None),
            god_mode: AtomicBool::new(false),
            attempting_lock: AtomicBool::new(false),
            flagged: AtomicBool::new(false),
            kicked: AtomicBool::new(false),
            kick_reason: Mutex::new(None),
            closed: AtomicBool::new(false),
            outbox,
            close_tx,
        };
        (connection, outbox_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the address was previously seen timing out.
    pub fn is_robot(&self) -> bool {
        self.robot
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name
            .read()
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn set_identity(&self, name: &str, rank: i32) {
        *self.name.write() = Some(name.to_string());
        self.rank.store(rank, Ordering::Release);
    }

    pub fn rank(&self) -> i32 {
        self.rank.load(Ordering::Acquire)
    }

    pub fn position(&self) -> Option<Position> {
        *self.position.lock()
    }

    pub fn set_position(&self, position: Position) {
        *self.position.lock() = Some(position);
    }

    pub fn god_mode(&self) -> bool {
        self.god_mode.load(Ordering::Acquire)
    }

    /// Flip god mode and return the new state.
    pub fn toggle_god_mode(&self) -> bool {
        !self.god_mode.fetch_xor(true, Ordering::AcqRel)
    }

    /// Make the next block placement create a chest lock.
    pub fn arm_lock(&self) {
        self.attempting_lock.store(true, Ordering::Release);
    }

    /// Consume the armed lock, if any.
    pub fn take_lock_attempt(&self) -> bool {
        self.attempting_lock.swap(false, Ordering::AcqRel)
    }

    /// Mark the player as suspicious. Returns true the first time.
    pub fn flag(&self) -> bool {
        !self.flagged.swap(true, Ordering::AcqRel)
    }

    #[cfg(test)]
    pub fn is_flagged(&self) -> bool {
        self.flagged.load(Ordering::Acquire)
    }

    /// Queue a chat line for the client. Dropped once the outbound tunnel is gone.
    pub fn send_message(&self, text: impl Into<String>) {
        let _ = self.outbox.send(Outgoing::Message(text.into()));
    }

    /// Ask the outbound tunnel to deliver a kick packet and close. Only the
    /// first kick counts.
    pub fn kick(&self, reason: &str) {
        if self.kicked.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.kick_reason.lock() = Some(reason.to_string());
        if self.robot {
            debug!("Kicking {self}: {reason}");
        } else {
            info!("Kicking {self}: {reason}");
        }
        let _ = self.outbox.send(Outgoing::Kick(reason.to_string()));
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked.load(Ordering::Acquire)
    }

    pub fn kick_reason(&self) -> Option<String> {
        self.kick_reason.lock().clone()
    }

    /// Close the connection and wake both tunnels. Returns true only for
    /// the call that actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.close_tx.send_replace(true);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// A receiver that changes once [`close`](Self::close) has run.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    pub fn is_guest(&self) -> bool {
        self.rank() < 0
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.read().as_deref() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{} ({})", self.addr, self.id),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_connection(slot: usize) -> (Connection, mpsc::UnboundedReceiver<Outgoing>) {
    let addr: SocketAddr = format!("127.0.0.1:{}", 40000 + slot)
        .parse()
        .unwrap();
    Connection::new(
        ConnectionId {
            slot,
            generation: 1,
        },
        addr,
        false,
    )
}
