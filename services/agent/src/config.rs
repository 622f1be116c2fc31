//! Agent configuration loading.
//!
//! INI is the sole config source; no environment variable overrides.
//! Default config path: `/etc/botfleet/agent.ini`.
//!
//! # Required fields
//! - `CORE.HOST`, `CORE.PORT` — the commander's agent-facing listener
//! - `CORE.CA_CERT` — path to the commander CA's DER certificate
//! - `CORE.CONN_BUFF` — per-read socket buffer size, in bytes

use std::path::Path;

use ini::Ini;

/// Validated agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    pub max_reconn: u32,
    pub conn_buff: usize,
    pub idle_timeout_secs: u64,
    pub recv_timeout_secs: u64,
    pub hello_freq_secs: u64,
    pub ca_cert_path: String,
}

pub fn load_config_from_path(path: &Path) -> Result<AgentConfig, ConfigError> {
    let ini = Ini::load_from_file(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
    load_config_from_ini(&ini)
}

pub fn load_config() -> Result<AgentConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/botfleet/agent.ini"))
}

fn load_config_from_ini(ini: &Ini) -> Result<AgentConfig, ConfigError> {
    let core = ini
        .section(Some("CORE"))
        .ok_or_else(|| ConfigError::MissingField("CORE".to_owned()))?;

    let host = core
        .get("HOST")
        .ok_or_else(|| ConfigError::MissingField("CORE.HOST".to_owned()))?
        .to_owned();
    let port = parse_required(core, "PORT")?;
    let conn_buff = core
        .get("CONN_BUFF")
        .ok_or_else(|| ConfigError::MissingField("CORE.CONN_BUFF".to_owned()))?
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue("CORE.CONN_BUFF must be a positive integer".to_owned()))?;
    let max_reconn = parse_optional(core, "MAX_RECONN")?.unwrap_or(6) as u32;
    let idle_timeout_secs = parse_optional(core, "IDLE_TIMEOUT")?.unwrap_or(60);
    let recv_timeout_secs = parse_optional(core, "RECV_TIMEOUT")?.unwrap_or(30);
    let hello_freq_secs = parse_optional(core, "HELLO_FREQ")?.unwrap_or(15);
    let ca_cert_path = core
        .get("CA_CERT")
        .ok_or_else(|| ConfigError::MissingField("CORE.CA_CERT".to_owned()))?
        .to_owned();

    Ok(AgentConfig {
        host,
        port,
        max_reconn,
        conn_buff,
        idle_timeout_secs,
        recv_timeout_secs,
        hello_freq_secs,
        ca_cert_path,
    })
}

fn parse_required(section: &ini::Properties, key: &str) -> Result<u16, ConfigError> {
    section
        .get(key)
        .ok_or_else(|| ConfigError::MissingField(format!("CORE.{key}")))?
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("CORE.{key} must be a port number")))
}

fn parse_optional(section: &ini::Properties, key: &str) -> Result<Option<u64>, ConfigError> {
    match section.get(key) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("CORE.{key} must be an integer"))),
        None => Ok(None),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ini_from(text: &str) -> Ini {
        Ini::load_from_str(text).unwrap()
    }

    #[test]
    fn loads_a_complete_config() {
        let ini = ini_from(
            "[CORE]\nHOST=commander.example\nPORT=9443\nMAX_RECONN=3\nCONN_BUFF=4096\nIDLE_TIMEOUT=45\nRECV_TIMEOUT=20\nHELLO_FREQ=10\nCA_CERT=/etc/botfleet/ca.der\n",
        );
        let cfg = load_config_from_ini(&ini).unwrap();
        assert_eq!(cfg.host, "commander.example");
        assert_eq!(cfg.port, 9443);
        assert_eq!(cfg.max_reconn, 3);
        assert_eq!(cfg.conn_buff, 4096);
        assert_eq!(cfg.ca_cert_path, "/etc/botfleet/ca.der");
    }

    #[test]
    fn missing_ca_cert_is_a_fatal_config_error() {
        let ini = ini_from("[CORE]\nHOST=commander.example\nPORT=9443\nCONN_BUFF=4096\n");
        let err = load_config_from_ini(&ini).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "CORE.CA_CERT"));
    }

    #[test]
    fn missing_conn_buff_is_a_fatal_config_error() {
        let ini = ini_from("[CORE]\nHOST=commander.example\nPORT=9443\nCA_CERT=/etc/botfleet/ca.der\n");
        let err = load_config_from_ini(&ini).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "CORE.CONN_BUFF"));
    }

    #[test]
    fn defaults_fill_in_missing_optional_fields() {
        let ini = ini_from(
            "[CORE]\nHOST=commander.example\nPORT=9443\nCONN_BUFF=4096\nCA_CERT=/etc/botfleet/ca.der\n",
        );
        let cfg = load_config_from_ini(&ini).unwrap();
        assert_eq!(cfg.max_reconn, 6);
        assert_eq!(cfg.hello_freq_secs, 15);
    }
}
