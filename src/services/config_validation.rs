//! Schema checks applied at the registry boundary
//!
//! Credentials, mapping documents, preference documents and schedules are all
//! validated here before anything is written.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::models::health::CredentialValidation;
use crate::models::integration::IntegrationType;

/// Only version of the preferences document this service understands
pub const SYNC_PREFERENCES_VERSION: u64 = 1;

const MAX_NAME_LEN: usize = 255;

/// Name and inclusive bounds of each cron field, in order
const CRON_FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    ("day-of-week", 0, 7),
];

lazy_static! {
    // One list item of a cron field: `*`, `n` or `a-b`, optionally `/step`
    static ref CRON_ITEM: Regex =
        Regex::new(r"^(?:(\*)|(\d+)(?:-(\d+))?)(?:/(\d+))?$").unwrap();
}

/// Stateless credential shape check for an integration type
pub fn validate_credentials(
    integration_type: IntegrationType,
    credentials: &Value,
) -> CredentialValidation {
    let Some(object) = credentials.as_object() else {
        return CredentialValidation {
            valid: false,
            message: "Credentials must be a JSON object".to_string(),
            permissions: vec![],
        };
    };

    let missing: Vec<&str> = integration_type
        .required_credential_keys()
        .iter()
        .copied()
        .filter(|key| {
            !object
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.trim().is_empty())
        })
        .collect();

    if !missing.is_empty() {
        return CredentialValidation {
            valid: false,
            message: format!(
                "Missing or empty credential fields for {}: {}",
                integration_type,
                missing.join(", ")
            ),
            permissions: vec![],
        };
    }

    CredentialValidation {
        valid: true,
        message: format!("Credentials are valid for {}", integration_type),
        permissions: integration_type
            .granted_permissions()
            .iter()
            .map(|p| p.to_string())
            .collect(),
    }
}

pub fn validate_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(format!("name cannot exceed {} characters", MAX_NAME_LEN));
    }
    Ok(())
}

/// Field mappings are a flat object of local field -> remote field
pub fn validate_field_mappings(mappings: &Value) -> Result<(), String> {
    let object = mappings
        .as_object()
        .ok_or_else(|| "fieldMappings must be a JSON object".to_string())?;

    for (local, remote) in object {
        if local.trim().is_empty() {
            return Err("fieldMappings keys cannot be empty".to_string());
        }
        match remote.as_str() {
            Some(r) if !r.trim().is_empty() => {}
            _ => {
                return Err(format!(
                    "fieldMappings.{} must map to a non-empty string",
                    local
                ))
            }
        }
    }
    Ok(())
}

/// Preferences are a versioned document: `{ "version": 1, "settings": {...} }`
pub fn validate_sync_preferences(preferences: &Value) -> Result<(), String> {
    let object = preferences
        .as_object()
        .ok_or_else(|| "syncPreferences must be a JSON object".to_string())?;

    match object.get("version").and_then(Value::as_u64) {
        Some(SYNC_PREFERENCES_VERSION) => {}
        Some(other) => return Err(format!("Unsupported syncPreferences version: {}", other)),
        None => return Err("syncPreferences.version is required".to_string()),
    }

    match object.get("settings") {
        Some(settings) if settings.is_object() => {}
        _ => return Err("syncPreferences.settings must be a JSON object".to_string()),
    }

    if let Some(extra) = object.keys().find(|k| *k != "version" && *k != "settings") {
        return Err(format!("Unknown syncPreferences field: {}", extra));
    }

    Ok(())
}

/// Five-field cron expression: minute hour day-of-month month day-of-week
pub fn validate_sync_schedule(schedule: &str) -> Result<(), String> {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!(
            "syncSchedule must have 5 cron fields, got {}",
            fields.len()
        ));
    }
    for (field, (name, min, max)) in fields.iter().zip(CRON_FIELDS) {
        if !cron_field_in_range(field, min, max) {
            return Err(format!(
                "Invalid {} field in syncSchedule: {} (allowed {}-{})",
                name, field, min, max
            ));
        }
    }
    Ok(())
}

fn cron_field_in_range(field: &str, min: u32, max: u32) -> bool {
    let in_range = |v: u32| (min..=max).contains(&v);

    field.split(',').all(|item| {
        let Some(caps) = CRON_ITEM.captures(item) else {
            return false;
        };
        let number = |i: usize| caps.get(i).map(|m| m.as_str().parse::<u32>().ok());

        let range_ok = match (caps.get(1), number(2), number(3)) {
            (Some(_), _, _) => true,
            (None, Some(Some(start)), None) => in_range(start),
            (None, Some(Some(start)), Some(Some(end))) => {
                in_range(start) && in_range(end) && start <= end
            }
            _ => false,
        };
        let step_ok = match number(4) {
            None => true,
            Some(Some(step)) => step >= 1 && step <= max,
            Some(None) => false,
        };
        range_ok && step_ok
    })
}
