//! Verdicts of the permission gate
use crashstats_core::{GatewayError, Permission};
use serde::Serialize;

/// The result of a permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Allow,

    /// Refused; `reason` is shown to the caller
    Forbid {
        reason: String,
        permission: Permission,
    },
}

impl Verdict {
    pub fn allow() -> Self {
        Verdict::Allow
    }

    /// Refuse a model the caller lacks `permission` for
    pub fn missing_for_endpoint(permission: Permission) -> Self {
        Verdict::Forbid {
            reason: format!(
                "Use of this endpoint requires the \"{}\" permission",
                permission.name()
            ),
            permission,
        }
    }

    /// Refuse a gated parameter value
    pub fn missing_for_param(param: &str, value: Option<&str>, permission: Permission) -> Self {
        let subject = match value {
            Some(value) => format!("{param}={value}"),
            None => param.to_string(),
        };
        Verdict::Forbid {
            reason: format!(
                "Use of \"{}\" requires the \"{}\" permission",
                subject,
                permission.name()
            ),
            permission,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn into_result(self) -> Result<(), GatewayError> {
        match self {
            Verdict::Allow => Ok(()),
            Verdict::Forbid { reason, .. } => Err(GatewayError::Forbidden(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_reason_names_permission() {
        let verdict = Verdict::missing_for_endpoint(Permission::ViewExploitability);
        assert!(!verdict.is_allowed());
        match verdict.into_result() {
            Err(GatewayError::Forbidden(reason)) => {
                assert!(reason.contains("View Exploitability Results"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_param_reason_names_value() {
        let verdict = Verdict::missing_for_param("format", Some("raw"), Permission::ViewRawdump);
        let Verdict::Forbid { reason, .. } = verdict else {
            panic!("expected Forbid");
        };
        assert!(reason.contains("format=raw"));
        assert!(reason.contains("View Raw Dumps"));
    }
}
