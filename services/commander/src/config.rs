//! Commander configuration loading.
//!
//! INI is the sole config source; no environment variable overrides.
//! Default config path: `/etc/botfleet/commander.ini`.
//!
//! # Required fields
//! - `CORE.HOST`, `CORE.PORT` — the agent-facing TLS listener
//! - `API.HOST`, `API.PORT` — the HTTP control-plane listener
//!
//! All other fields fall back to documented defaults.

use std::path::Path;

use ini::Ini;

/// Validated commander configuration.
#[derive(Debug, Clone)]
pub struct CommanderConfig {
    pub core: CoreConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub host: String,
    pub port: u16,
    pub offline_timeout_secs: u64,
    pub cmd_timeout_secs: u64,
    pub resp_wait_window_secs: u64,
    pub base_path: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Load commander config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<CommanderConfig, ConfigError> {
    let ini = Ini::load_from_file(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
    load_config_from_ini(&ini)
}

/// Load commander config from the default path `/etc/botfleet/commander.ini`.
pub fn load_config() -> Result<CommanderConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/botfleet/commander.ini"))
}

fn load_config_from_ini(ini: &Ini) -> Result<CommanderConfig, ConfigError> {
    let core_section = ini
        .section(Some("CORE"))
        .ok_or_else(|| ConfigError::MissingField("CORE".to_owned()))?;

    let host = core_section
        .get("HOST")
        .ok_or_else(|| ConfigError::MissingField("CORE.HOST".to_owned()))?
        .to_owned();
    let port = parse_required(core_section, "CORE", "PORT")?;
    let offline_timeout_secs = parse_optional(core_section, "OFFLINE_TOUT")?.unwrap_or(120);
    let cmd_timeout_secs = parse_optional(core_section, "CMD_TOUT")?.unwrap_or(15);
    let resp_wait_window_secs = parse_optional(core_section, "RESP_WAIT_WINDOW")?.unwrap_or(5);
    let base_path = core_section
        .get("BASE_PATH")
        .unwrap_or("/var/lib/botfleet")
        .to_owned();

    let api_section = ini
        .section(Some("API"))
        .ok_or_else(|| ConfigError::MissingField("API".to_owned()))?;
    let api_host = api_section
        .get("HOST")
        .ok_or_else(|| ConfigError::MissingField("API.HOST".to_owned()))?
        .to_owned();
    let api_port = parse_required(api_section, "API", "PORT")?;

    Ok(CommanderConfig {
        core: CoreConfig {
            host,
            port,
            offline_timeout_secs,
            cmd_timeout_secs,
            resp_wait_window_secs,
            base_path,
        },
        api: ApiConfig {
            host: api_host,
            port: api_port,
        },
    })
}

fn parse_required(
    section: &ini::Properties,
    section_name: &str,
    key: &str,
) -> Result<u16, ConfigError> {
    section
        .get(key)
        .ok_or_else(|| ConfigError::MissingField(format!("{section_name}.{key}")))?
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{section_name}.{key} must be a port number")))
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
            "[CORE]\nHOST=0.0.0.0\nPORT=9443\nOFFLINE_TOUT=90\nCMD_TOUT=20\nRESP_WAIT_WINDOW=3\nBASE_PATH=/tmp/bf\n[API]\nHOST=127.0.0.1\nPORT=8080\n",
        );
        let cfg = load_config_from_ini(&ini).unwrap();
        assert_eq!(cfg.core.host, "0.0.0.0");
        assert_eq!(cfg.core.port, 9443);
        assert_eq!(cfg.core.offline_timeout_secs, 90);
        assert_eq!(cfg.api.port, 8080);
    }

    #[test]
    fn missing_core_port_is_a_fatal_config_error() {
        let ini = ini_from("[CORE]\nHOST=0.0.0.0\n[API]\nHOST=127.0.0.1\nPORT=8080\n");
        let err = load_config_from_ini(&ini).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "CORE.PORT"));
    }

    #[test]
    fn defaults_fill_in_missing_optional_fields() {
        let ini = ini_from("[CORE]\nHOST=0.0.0.0\nPORT=9443\n[API]\nHOST=127.0.0.1\nPORT=8080\n");
        let cfg = load_config_from_ini(&ini).unwrap();
        assert_eq!(cfg.core.cmd_timeout_secs, 15);
        assert_eq!(cfg.core.resp_wait_window_secs, 5);
    }
}
