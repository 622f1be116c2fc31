//! Request validators for the HTTP control plane.
//!
//! Every validator returns a descriptive `String` naming the offending
//! field on failure; handlers turn that into a 400 [`ErrorEnvelope`].

use botfleet_protocol::ScriptType;

pub fn status(raw: Option<&str>) -> Result<Option<bool>, String> {
    match raw {
        None | Some("") => Ok(None),
        Some("online") => Ok(Some(true)),
        Some("offline") => Ok(Some(false)),
        Some(other) => Err(format!("status must be \"online\" or \"offline\", got \"{other}\"")),
    }
}

pub fn os(raw: Option<&str>) -> Result<Option<String>, String> {
    match raw {
        None | Some("") => Ok(None),
        Some(v) if matches!(v, "Windows" | "Linux" | "Darwin") => Ok(Some(v.to_owned())),
        Some(other) => Err(format!(
            "os must be one of Windows, Linux, Darwin, got \"{other}\""
        )),
    }
}

/// `entity` is `*` or a syntactically valid 128-bit identifier (32 lowercase
/// hex characters, matching the format the agent's identity file persists).
pub fn entity(raw: &str) -> Result<String, String> {
    if raw == "*" {
        return Ok(raw.to_owned());
    }
    if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(raw.to_owned());
    }
    Err(format!("entity must be \"*\" or a 32-character hex id, got \"{raw}\""))
}

pub fn script_type(raw: &str) -> Result<ScriptType, String> {
    match raw {
        "sh" => Ok(ScriptType::Sh),
        "powershell" => Ok(ScriptType::Powershell),
        "python" => Ok(ScriptType::Python),
        other => Err(format!(
            "type must be one of sh, powershell, python, got \"{other}\""
        )),
    }
}

pub fn script_path(raw: &str) -> Result<String, String> {
    let path = std::path::Path::new(raw);
    if !path.is_file() {
        return Err(format!("script_path \"{raw}\" does not exist or is not a file"));
    }
    Ok(raw.to_owned())
}

pub fn timeout(raw: u64) -> Result<u64, String> {
    if (1..=86400).contains(&raw) {
        Ok(raw)
    } else {
        Err(format!("timeout must be between 1 and 86400, got {raw}"))
    }
}
