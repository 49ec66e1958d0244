use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
pub struct GateConfig {
    pub proxy: ProxySection,
    pub server: ServerSection,
    #[serde(default)]
    pub tunnel: TunnelSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub permissions: PermissionsSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Where clients connect.
#[derive(Debug, Deserialize)]
pub struct ProxySection {
    pub address: String,
    pub port: u16,
    pub max_players: u32,
}

/// The wrapped game server.
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct TunnelSection {
    /// Seconds without inbound bytes before a tunnel closes its connection.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_serverbound_capacity")]
    pub serverbound_capacity: usize,
    #[serde(default = "default_clientbound_capacity")]
    pub clientbound_capacity: usize,
    #[serde(default = "default_serverbound_flush")]
    pub serverbound_flush_threshold: usize,
    #[serde(default = "default_clientbound_flush")]
    pub clientbound_flush_threshold: usize,
    /// Every n-th client movement packet updates the stored position.
    #[serde(default = "default_position_sample_rate")]
    pub position_sample_rate: u32,
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_serverbound_capacity() -> usize {
    8192
}

// Large enough for a full map chunk (0x33) after compression.
fn default_clientbound_capacity() -> usize {
    131_072
}

fn default_serverbound_flush() -> usize {
    256
}

fn default_clientbound_flush() -> usize {
    2048
}

fn default_position_sample_rate() -> u32 {
    4
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            serverbound_capacity: default_serverbound_capacity(),
            clientbound_capacity: default_clientbound_capacity(),
            serverbound_flush_threshold: default_serverbound_flush(),
            clientbound_flush_threshold: default_clientbound_flush(),
            position_sample_rate: default_position_sample_rate(),
        }
    }
}

impl TunnelSection {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatSection {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Replacement for the `<Name> ` prefix of player chat. Supports
    /// `{name}` and `{rank}`.
    #[serde(default)]
    pub format: Option<String>,
    /// Block radius of `!local` chat.
    #[serde(default = "default_local_radius")]
    pub local_radius: f64,
}

fn default_command_prefix() -> String {
    "!".into()
}

fn default_local_radius() -> f64 {
    64.0
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            format: None,
            local_radius: default_local_radius(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PermissionsSection {
    #[serde(default)]
    pub whitelist_enabled: bool,
    #[serde(default = "default_admin_rank")]
    pub admin_rank: i32,
    /// Rank of players missing from `members.json`.
    #[serde(default)]
    pub default_rank: i32,
    #[serde(default)]
    pub auto_ban: bool,
}

fn default_admin_rank() -> i32 {
    3
}

impl Default for PermissionsSection {
    fn default() -> Self {
        Self {
            whitelist_enabled: false,
            admin_rank: default_admin_rank(),
            default_rank: 0,
            auto_ban: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DataSection {
    #[serde(default = "default_data_directory")]
    pub directory: String,
}

fn default_data_directory() -> String {
    "data".into()
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            directory: default_data_directory(),
        }
    }
}

impl DataSection {
    pub fn path(&self, file: &str) -> PathBuf {
        Path::new(&self.directory).join(file)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl GateConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        if config.proxy.max_players == 0 {
            return Err(ConfigError::Invalid("proxy.max_players must be at least 1".into()));
        }
        if config.tunnel.position_sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "tunnel.position_sample_rate must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.proxy.address, self.proxy.port)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }

    /// Minimal configuration for tests.
    #[cfg(test)]
    pub fn for_tests(max_players: u32) -> Self {
        Self {
            proxy: ProxySection {
                address: "127.0.0.1".into(),
                port: 0,
                max_players,
            },
            server: ServerSection {
                address: "127.0.0.1".into(),
                port: 25566,
            },
            tunnel: TunnelSection::default(),
            chat: ChatSection::default(),
            permissions: PermissionsSection::default(),
            data: DataSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config() {
        let toml_str = r#"
            [proxy]
            address = "0.0.0.0"
            port = 25565
            max_players = 20

            [server]
            address = "127.0.0.1"
            port = 25566

            [logging]
            level = "debug"
        "#;
        let config = GateConfig::parse(toml_str).unwrap();
        assert_eq!(config.proxy.port, 25565);
        assert_eq!(config.proxy.max_players, 20);
        assert_eq!(config.listen_addr(), "0.0.0.0:25565");
        assert_eq!(config.server_addr(), "127.0.0.1:25566");
        assert_eq!(config.logging.level, "debug");
        // tunnel section defaults when absent
        assert_eq!(config.tunnel.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.tunnel.serverbound_capacity, 8192);
        assert_eq!(config.tunnel.clientbound_flush_threshold, 2048);
        assert_eq!(config.tunnel.position_sample_rate, 4);
        // chat section defaults when absent
        assert_eq!(config.chat.command_prefix, "!");
        assert!(config.chat.format.is_none());
        // permissions section defaults when absent
        assert!(!config.permissions.whitelist_enabled);
        assert_eq!(config.permissions.admin_rank, 3);
        assert_eq!(config.permissions.default_rank, 0);
        assert!(!config.permissions.auto_ban);
        assert_eq!(config.data.path("mutes.json"), Path::new("data/mutes.json"));
    }

    #[test]
    fn parse_config_with_overrides() {
        let toml_str = r#"
            [proxy]
            address = "0.0.0.0"
            port = 25565
            max_players = 8

            [server]
            address = "10.0.0.2"
            port = 25565

            [chat]
            command_prefix = "/"
            format = "[{rank}] {name}: "

            [permissions]
            whitelist_enabled = true
            admin_rank = 5
            default_rank = -1
            auto_ban = true

            [tunnel]
            idle_timeout_secs = 5
        "#;
        let config = GateConfig::parse(toml_str).unwrap();
        assert_eq!(config.chat.command_prefix, "/");
        assert_eq!(config.chat.format.as_deref(), Some("[{rank}] {name}: "));
        assert!(config.permissions.whitelist_enabled);
        assert_eq!(config.permissions.admin_rank, 5);
        assert_eq!(config.permissions.default_rank, -1);
        assert!(config.permissions.auto_ban);
        assert_eq!(config.tunnel.idle_timeout_secs, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn zero_players_is_rejected() {
        let toml_str = r#"
            [proxy]
            address = "0.0.0.0"
            port = 25565
            max_players = 0

            [server]
            address = "127.0.0.1"
            port = 25566
        "#;
        assert!(matches!(
            GateConfig::parse(toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        assert!(matches!(
            GateConfig::parse("[proxy]\naddress = \"x\"\nport = 1\nmax_players = 1\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
