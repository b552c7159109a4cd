use error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub transport: TransportSettings,
    pub demo: DemoSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub bind_address: String,
    pub peer_address: String,
}

/// Overridable copies of the design constants in `rudp_core::TransportConfig`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransportSettings {
    pub payload_size: usize,
    pub rto_ms: u64,
    pub recv_poll_ms: u64,
    pub handshake_timeout_ms: u64,
    pub recv_buffer_pkts: usize,
    pub init_cwnd: f64,
    pub init_ssthresh: f64,
    pub dup_ack_threshold: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DemoSettings {
    pub total_packets: u32,
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9000".to_string(),
            peer_address: "127.0.0.1:9001".to_string(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        let defaults = rudp_core::TransportConfig::default();
        Self {
            payload_size: defaults.payload_size,
            rto_ms: defaults.rto.as_millis() as u64,
            recv_poll_ms: defaults.recv_poll.as_millis() as u64,
            handshake_timeout_ms: defaults.handshake_timeout.as_millis() as u64,
            recv_buffer_pkts: defaults.recv_buffer_pkts,
            init_cwnd: defaults.init_cwnd,
            init_ssthresh: defaults.init_ssthresh,
            dup_ack_threshold: defaults.dup_ack_threshold,
        }
    }
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            total_packets: 10_000,
            packet_loss_rate: 0.1,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            transport: TransportSettings::default(),
            demo: DemoSettings::default(),
        }
    }
}

impl TransportSettings {
    pub fn to_transport_config(&self) -> rudp_core::TransportConfig {
        rudp_core::TransportConfig {
            payload_size: self.payload_size,
            rto: std::time::Duration::from_millis(self.rto_ms),
            recv_poll: std::time::Duration::from_millis(self.recv_poll_ms),
            handshake_timeout: std::time::Duration::from_millis(self.handshake_timeout_ms),
            recv_buffer_pkts: self.recv_buffer_pkts,
            init_cwnd: self.init_cwnd,
            init_ssthresh: self.init_ssthresh,
            dup_ack_threshold: self.dup_ack_threshold,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if SocketAddr::from_str(&self.network.bind_address).is_err() {
            return Err(ConfigError::Validation(format!(
                "invalid bind address '{}', expected 'IP:PORT'",
                self.network.bind_address
            )));
        }
        if SocketAddr::from_str(&self.network.peer_address).is_err() {
            return Err(ConfigError::Validation(format!(
                "invalid peer address '{}', expected 'IP:PORT'",
                self.network.peer_address
            )));
        }
        if self.transport.payload_size == 0 {
            return Err(ConfigError::Validation(
                "transport.payload_size must be greater than 0".to_string(),
            ));
        }
        if self.transport.recv_buffer_pkts == 0 {
            return Err(ConfigError::Validation(
                "transport.recv_buffer_pkts must be greater than 0".to_string(),
            ));
        }
        if self.demo.total_packets == 0 {
            return Err(ConfigError::Validation(
                "demo.total_packets must be greater than 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.demo.packet_loss_rate) {
            return Err(ConfigError::Validation(
                "demo.packet_loss_rate must be in [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn handle() -> Result<Config, ConfigError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() {
        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, &config_path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_content = toml::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(config_content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_malformed_bind_address() {
        let mut config = Config::default();
        config.network.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_total_packets() {
        let mut config = Config::default();
        config.demo.total_packets = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_loss_rate() {
        let mut config = Config::default();
        config.demo.packet_loss_rate = 1.0;
        assert!(config.validate().is_err());
    }
}
