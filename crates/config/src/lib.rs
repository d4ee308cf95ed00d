//! Gateway configuration management
//!
//! Loads the gateway's options from a plain `key = value` text file, one
//! option per line, `#` for comments. Unknown keys are ignored so the same
//! file can feed other services of the world installation.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use otgate_core::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// World name the client must present in its greeting line.
    pub server_name: String,
    /// Address the game service binds to when `bind_only_global_address`
    /// is set; otherwise the service binds the wildcard address.
    pub ip: String,
    /// Bind only the configured `ip` instead of 0.0.0.0.
    pub bind_only_global_address: bool,
    /// Game service port.
    pub game_port: u16,
    /// Status service port (the status service itself lives elsewhere).
    pub status_port: u16,
    /// Login portal port (the portal itself lives elsewhere).
    pub http_port: u16,
    /// Capacity gate for the wait-list; 0 disables the list entirely.
    pub max_players: u32,
    /// Surface premium-until as 0 when everyone is treated as premium.
    pub free_premium: bool,
    /// Allow the same character to be in the world more than once.
    pub allow_clones: bool,
    /// Reject a login while another character of the account is online.
    pub one_player_per_account: bool,
    /// Reserved reconnect-kick switch; parsed but not acted on.
    pub replace_kick_on_login: bool,
    /// Inbound command rate above which a connection is dropped.
    pub max_packets_per_second: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_name: "Gateway".into(),
            ip: "127.0.0.1".into(),
            bind_only_global_address: false,
            game_port: 7172,
            status_port: 7171,
            http_port: 8080,
            max_players: 900,
            free_premium: false,
            allow_clones: false,
            one_player_per_account: true,
            replace_kick_on_login: false,
            max_packets_per_second: 25,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a config file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            GatewayError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse config file content, starting from defaults.
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(eq_pos) = line.find('=') {
                let key = line[..eq_pos].trim();
                let value = line[eq_pos + 1..].trim().trim_matches('"');
                config.parse_option(key, value);
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key {
            "server_name" => self.server_name = value.into(),
            "ip" => self.ip = value.into(),
            "bind_only_global_address" => {
                self.bind_only_global_address = value.parse().unwrap_or(false);
            }
            "game_port" => {
                self.game_port = value.parse().unwrap_or(7172);
            }
            "status_port" => {
                self.status_port = value.parse().unwrap_or(7171);
            }
            "http_port" => {
                self.http_port = value.parse().unwrap_or(8080);
            }
            "max_players" => {
                self.max_players = value.parse().unwrap_or(900);
            }
            "free_premium" => {
                self.free_premium = value.parse().unwrap_or(false);
            }
            "allow_clones" => {
                self.allow_clones = value.parse().unwrap_or(false);
            }
            "one_player_per_account" => {
                self.one_player_per_account = value.parse().unwrap_or(true);
            }
            "replace_kick_on_login" => {
                self.replace_kick_on_login = value.parse().unwrap_or(false);
            }
            "max_packets_per_second" => {
                self.max_packets_per_second = value.parse().unwrap_or(25);
            }
            _ => {
                tracing::debug!("unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Bind address for the game service listener.
    pub fn bind_address(&self) -> SocketAddr {
        let ip: IpAddr = if self.bind_only_global_address {
            self.ip
                .parse()
                .unwrap_or_else(|_| IpAddr::V4(Ipv4Addr::UNSPECIFIED))
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        SocketAddr::new(ip, self.game_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.game_port, 7172);
        assert_eq!(config.max_players, 900);
        assert!(!config.bind_only_global_address);
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# world identity
server_name = Midgard
game_port = 9172
max_players = 50
one_player_per_account = false
"#;
        let config = GatewayConfig::parse(config_text);
        assert_eq!(config.server_name, "Midgard");
        assert_eq!(config.game_port, 9172);
        assert_eq!(config.max_players, 50);
        assert!(!config.one_player_per_account);
    }

    #[test]
    fn test_bind_address_honours_global_flag() {
        let mut config = GatewayConfig::default();
        config.ip = "10.0.0.9".into();
        assert_eq!(config.bind_address().ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        config.bind_only_global_address = true;
        assert_eq!(config.bind_address().ip(), "10.0.0.9".parse::<IpAddr>().unwrap());
        assert_eq!(config.bind_address().port(), 7172);
    }
}
