//! Effective permission resolution.
//!
//! A user's effective permissions are the grants of every group they belong
//! to, overlaid with their own explicit overrides. An explicit `false` always
//! beats a group grant; anything absent is denied.

use std::collections::{BTreeMap, BTreeSet};

/// Resolved or explicit grant/deny map keyed by permission key.
pub type PermissionMap = BTreeMap<String, bool>;

/// Set of keys granted by a single group.
pub type PermissionSet = BTreeSet<String>;

/// Folds group grants and per-user overrides into the effective map.
///
/// Groups are applied first (every present key becomes `true`), then the
/// overrides are applied last so they win in both directions.
pub fn effective_permissions<'a, I>(groups: I, overrides: &PermissionMap) -> PermissionMap
where
    I: IntoIterator<Item = &'a PermissionSet>,
{
    let mut effective = PermissionMap::new();

    for group in groups {
        for key in group {
            effective.insert(key.clone(), true);
        }
    }

    for (key, granted) in overrides {
        effective.insert(key.clone(), *granted);
    }

    effective
}

/// Looks a key up in a resolved map. Absent keys are denied.
#[must_use]
pub fn authorize(effective: &PermissionMap, key: &str) -> bool {
    effective.get(key).copied().unwrap_or(false)
}

/// Decodes the JSON object stored on a user row. Legacy or empty values decode
/// to an empty map.
pub fn decode_overrides(raw: &str) -> anyhow::Result<PermissionMap> {
    if raw.trim().is_empty() {
        return Ok(PermissionMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_overrides(overrides: &PermissionMap) -> String {
    serde_json::to_string(overrides).unwrap_or_else(|_| "{}".to_string())
}

/// Decodes the JSON array stored on a group row.
pub fn decode_group_permissions(raw: &str) -> anyhow::Result<PermissionSet> {
    if raw.trim().is_empty() {
        return Ok(PermissionSet::new());
    }
    Ok(serde_json::from_str(raw)?)
}

pub fn encode_group_permissions(permissions: &PermissionSet) -> String {
    serde_json::to_string(permissions).unwrap_or_else(|_| "[]".to_string())
}
