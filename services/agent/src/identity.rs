//! Local identifier persistence.
//!
//! A stable 128-bit id is generated once and read verbatim on every
//! subsequent start. Stored under a user-writable XDG state directory
//! rather than the source's root-owned `/opt/bot-agent/`, since this agent
//! is not assumed to run as root.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Resolves `$XDG_STATE_HOME/botfleet-agent/agent.id`, falling back to
/// `~/.local/state/botfleet-agent/agent.id` on Unix.
pub fn default_identity_path() -> PathBuf {
    let state_dir = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .unwrap_or_else(|| PathBuf::from(".local/state"));
    state_dir.join("botfleet-agent").join("agent.id")
}

/// Reads the identifier at `path`, creating and persisting a fresh one if
/// absent.
pub fn load_or_create(path: &Path) -> std::io::Result<String> {
    if path.is_file() {
        let contents = fs::read_to_string(path)?;
        return Ok(contents.trim().to_owned());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let id = Uuid::new_v4().simple().to_string();
    fs::write(path, &id)?;
    Ok(id)
}
