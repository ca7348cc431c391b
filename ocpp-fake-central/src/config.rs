use ocpp_core::TransportKind;
use serde::{Deserialize, Serialize};

/// Where the fake central system listens and what its canned answers carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralSystemConfig {
    pub host: String,
    pub json_port: u16,
    pub soap_port: u16,
    /// Heartbeat interval, in seconds, handed out in boot confirmations.
    pub heartbeat_interval: i32,
    /// Transaction id handed out in start transaction confirmations.
    pub transaction_id: i32,
}

impl Default for CentralSystemConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            json_port: TransportKind::Json.default_port(),
            soap_port: TransportKind::Soap.default_port(),
            heartbeat_interval: 1,
            transaction_id: 1,
        }
    }
}

impl CentralSystemConfig {
    pub fn port_for(&self, kind: TransportKind) -> u16 {
        match kind {
            TransportKind::Json => self.json_port,
            TransportKind::Soap => self.soap_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_transport_ports() {
        let config = CentralSystemConfig::default();
        assert_eq!(config.port_for(TransportKind::Json), 8887);
        assert_eq!(config.port_for(TransportKind::Soap), 8890);
        assert_eq!(config.heartbeat_interval, 1);
    }

    #[test]
    fn test_partial_config_fills_in_defaults() {
        let config: CentralSystemConfig =
            serde_json::from_str(r#"{ "soap_port": 9000, "heartbeat_interval": 30 }"#).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.json_port, 8887);
        assert_eq!(config.port_for(TransportKind::Soap), 9000);
        assert_eq!(config.heartbeat_interval, 30);
    }
}
