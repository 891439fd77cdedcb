use super::ApiError;
use crate::domain::permissions::{PermissionMap, PermissionSet};
use crate::domain::{GroupId, UserId};

pub fn validate_user_id(id: i32) -> Result<UserId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid user ID: {}. ID must be a positive integer",
            id
        )));
    }
    Ok(UserId::new(id))
}

pub fn validate_group_id(id: i32) -> Result<GroupId, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid group ID: {}. ID must be a positive integer",
            id
        )));
    }
    Ok(GroupId::new(id))
}

/// HTML checkboxes are absent when unchecked.
#[must_use]
pub fn parse_checkbox(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "on" | "true" | "yes")
    )
}

/// Parses `groups=1,3`.
pub fn parse_group_ids(raw: Option<&str>) -> Result<Vec<GroupId>, ApiError> {
    split_list(raw)
        .map(|part| {
            part.parse::<i32>()
                .map_err(|_| ApiError::validation(format!("Invalid group ID: {part:?}")))
                .and_then(validate_group_id)
        })
        .collect()
}

/// Parses `permissions=admin=allow,superuser=deny`.
pub fn parse_permission_overrides(raw: Option<&str>) -> Result<PermissionMap, ApiError> {
    split_list(raw)
        .map(|part| {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ApiError::validation(format!("Permission override must be key=allow|deny: {part:?}"))
            })?;
            let granted = match value.trim().to_ascii_lowercase().as_str() {
                "allow" | "true" | "1" => true,
                "deny" | "false" | "0" => false,
                other => {
                    return Err(ApiError::validation(format!(
                        "Unknown permission value {other:?} for {key:?}"
                    )));
                }
            };
            Ok((key.trim().to_string(), granted))
        })
        .collect()
}

/// Parses `permissions=admin,editor`.
#[must_use]
pub fn parse_permission_keys(raw: Option<&str>) -> PermissionSet {
    split_list(raw).map(str::to_string).collect()
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ids() {
        assert!(validate_user_id(1).is_ok());
        assert!(validate_user_id(0).is_err());
        assert!(validate_group_id(-3).is_err());
    }

    #[test]
    fn test_parse_checkbox() {
        assert!(parse_checkbox(Some("on")));
        assert!(parse_checkbox(Some("1")));
        assert!(!parse_checkbox(Some("0")));
        assert!(!parse_checkbox(None));
    }

    #[test]
    fn test_parse_group_ids() {
        let ids = parse_group_ids(Some("1, 3,,")).unwrap();
        assert_eq!(ids, vec![GroupId::new(1), GroupId::new(3)]);
        assert!(parse_group_ids(None).unwrap().is_empty());
        assert!(parse_group_ids(Some("1,x")).is_err());
        assert!(parse_group_ids(Some("0")).is_err());
    }

    #[test]
    fn test_parse_permission_overrides() {
        let map = parse_permission_overrides(Some("admin=allow, superuser=deny")).unwrap();
        assert_eq!(map.get("admin"), Some(&true));
        assert_eq!(map.get("superuser"), Some(&false));
        assert!(parse_permission_overrides(Some("admin")).is_err());
        assert!(parse_permission_overrides(Some("admin=maybe")).is_err());
        assert!(parse_permission_overrides(Some("")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_permission_keys() {
        let set = parse_permission_keys(Some("admin, editor"));
        assert!(set.contains("admin"));
        assert!(set.contains("editor"));
        assert_eq!(set.len(), 2);
    }
}
