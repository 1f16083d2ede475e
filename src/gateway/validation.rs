use std::sync::OnceLock;

use regex::Regex;

use crate::error::{OrchestratorError, Result};

const MAX_PACKAGE_NAME_LEN: usize = 256;

fn store_url_param() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"id=([a-zA-Z0-9_.]+)").expect("valid regex"))
}

fn package_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*(\.[a-zA-Z][a-zA-Z0-9_]*)+$").expect("valid regex")
    })
}

fn apk_filename() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+\.apk$").expect("valid regex"))
}

/// Normalize and check a package name.
///
/// Accepts a bare name (`com.example.app`) or a store URL carrying it in an
/// `id=` parameter, and returns the bare name.
pub fn validate_package_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OrchestratorError::Validation(
            "Package name is required".to_string(),
        ));
    }

    let name = store_url_param()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |m| m.as_str());

    if name.len() > MAX_PACKAGE_NAME_LEN {
        return Err(OrchestratorError::Validation(
            "Package name too long".to_string(),
        ));
    }

    if !package_name().is_match(name) {
        return Err(OrchestratorError::Validation(
            "Invalid package name format".to_string(),
        ));
    }

    Ok(name.to_string())
}

pub fn validate_filename(filename: &str) -> Result<&str> {
    if apk_filename().is_match(filename) {
        Ok(filename)
    } else {
        Err(OrchestratorError::Validation("Invalid filename".to_string()))
    }
}
