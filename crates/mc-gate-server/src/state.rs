//! State shared by every connection task.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{info, warn};

use mc_gate_proto::types::ItemStack;
use mc_gate_proto::PROTOCOL_VERSION;

use crate::commands::{ChatCommands, CommandParser};
use crate::config::GateConfig;
use crate::connection::Connection;
use crate::diagnostics::DiagnosticSink;
use crate::policy::Policy;
use crate::pool::ConnectionPool;

const MAX_NAME_LENGTH: usize = 16;

/// Addresses that previously disconnected with a timeout.
#[derive(Default)]
pub struct RobotRegistry {
    addrs: RwLock<HashSet<IpAddr>>,
}

impl RobotRegistry {
    pub fn mark(&self, ip: IpAddr) {
        if self.addrs.write().insert(ip) {
            info!("Marked {ip} as a robot");
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.addrs.read().contains(&ip)
    }
}

pub struct ProxyState {
    pub config: GateConfig,
    pub pool: ConnectionPool,
    pub policy: Policy,
    pub commands: Box<dyn CommandParser>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
    pub robots: RobotRegistry,
    shutdown: watch::Sender<bool>,
}

impl ProxyState {
    pub fn new(config: GateConfig, policy: Policy, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        let commands = ChatCommands::new(
            &config.chat.command_prefix,
            config.permissions.admin_rank,
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            pool: ConnectionPool::new(config.proxy.max_players),
            commands: Box::new(commands),
            policy,
            diagnostics,
            robots: RobotRegistry::default(),
            config,
            shutdown,
        }
    }

    pub fn is_admin(&self, connection: &Connection) -> bool {
        connection.rank() >= self.config.permissions.admin_rank
    }

    /// Send a line to every logged-in player.
    pub fn broadcast(&self, message: &str) {
        for connection in self.pool.iter().filter(|c| c.name().is_some()) {
            connection.send_message(message);
        }
    }

    pub fn notify_admins(&self, message: &str) {
        for connection in self.pool.iter().filter(|c| self.is_admin(c)) {
            connection.send_message(message);
        }
    }

    /// Rejection reason for a name, checked at handshake and again at login.
    pub fn check_name(&self, name: &str) -> Result<(), String> {
        let valid = !name.is_empty()
            && name.len() <= MAX_NAME_LENGTH
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err("Invalid username".into());
        }
        if let Some(ban) = self.policy.access.name_ban(name) {
            return Err(format!("You are banned: {}", ban.reason));
        }
        if !self.policy.access.is_whitelisted(name) {
            return Err("You are not white-listed on this server!".into());
        }
        Ok(())
    }

    /// Full login check for `connection` asking to play as `name`.
    pub fn check_login(
        &self,
        connection: &Connection,
        name: &str,
        protocol: i32,
    ) -> Result<(), String> {
        if protocol != PROTOCOL_VERSION {
            return Err(format!(
                "Unsupported protocol {protocol}, this server runs Beta 1.7.3"
            ));
        }
        self.check_name(name)?;
        let in_use = self
            .pool
            .iter()
            .any(|other| other.id() != connection.id() && other.has_name(name));
        if in_use {
            return Err("That name is already in use".into());
        }
        if self.pool.online_count() >= self.config.proxy.max_players as usize {
            return Err("The server is full!".into());
        }
        Ok(())
    }

    /// A player moved a watched item in bulk without the rank for it.
    pub fn escalate(&self, connection: &Connection, item: ItemStack) {
        warn!(
            "{connection} tried to move {} of item {} (rank {})",
            item.count,
            item.id,
            connection.rank()
        );
        if connection.flag() {
            self.notify_admins(&format!(
                "{connection} was flagged for moving {} x item {}",
                item.count, item.id
            ));
        }
        if self.config.permissions.auto_ban {
            if let Some(name) = connection.name() {
                self.policy.access.ban_name(&name, "item abuse");
            }
            connection.kick("Banned: item abuse");
        }
    }

    pub fn kick_all(&self, reason: &str) {
        for connection in self.pool.iter() {
            connection.kick(reason);
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    #[cfg(test)]
    pub fn for_tests(config: GateConfig, policy: Policy) -> Self {
        Self::new(
            config,
            policy,
            Arc::new(crate::diagnostics::MemorySink::default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::access::AccessList;
    use std::net::SocketAddr;

    fn state(max_players: u32) -> ProxyState {
        let config = GateConfig::for_tests(max_players);
        let policy = Policy::in_memory(&config);
        ProxyState::for_tests(config, policy)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn name_rules() {
        let state = state(4);
        assert!(state.check_name("Steve_01").is_ok());
        assert!(state.check_name("").is_err());
        assert!(state.check_name("seventeen_chars__").is_err());
        assert!(state.check_name("bad name").is_err());
        assert!(state.check_name("§cRed").is_err());
    }

    #[test]
    fn whitelist_and_bans() {
        let config = GateConfig::for_tests(4);
        let mut policy = Policy::in_memory(&config);
        policy.access = AccessList::in_memory(&["Alice"], true);
        let state = ProxyState::for_tests(config, policy);

        assert!(state.check_name("alice").is_ok());
        assert!(state.check_name("Bob").is_err());
        state.policy.access.ban_name("Alice", "griefing");
        assert_eq!(
            state.check_name("Alice").unwrap_err(),
            "You are banned: griefing"
        );
    }

    #[test]
    fn login_rejects_duplicate_names_and_full_server() {
        let state = state(1);
        let (first, _rx1) = state.pool.acquire(addr(1), false).unwrap();
        let (second, _rx2) = state.pool.acquire(addr(2), false).unwrap();

        assert!(state.check_login(&first, "Steve", 13).is_err());
        assert!(state.check_login(&first, "Steve", PROTOCOL_VERSION).is_ok());
        first.set_identity("Steve", 0);

        assert_eq!(
            state.check_login(&second, "steve", PROTOCOL_VERSION).unwrap_err(),
            "That name is already in use"
        );
        assert_eq!(
            state.check_login(&second, "Alex", PROTOCOL_VERSION).unwrap_err(),
            "The server is full!"
        );
    }

    #[test]
    fn robots_are_remembered() {
        let state = state(1);
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        assert!(!state.robots.contains(ip));
        state.robots.mark(ip);
        assert!(state.robots.contains(ip));
    }

    #[test]
    fn broadcast_reaches_named_players_only() {
        let state = state(2);
        let (named, mut named_rx) = state.pool.acquire(addr(1), false).unwrap();
        let (_anon, mut anon_rx) = state.pool.acquire(addr(2), false).unwrap();
        named.set_identity("Steve", 0);
        state.broadcast("hello all");
        assert!(named_rx.try_recv().is_ok());
        assert!(anon_rx.try_recv().is_err());
    }
}
