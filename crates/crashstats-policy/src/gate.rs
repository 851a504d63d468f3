//! The permission gate.
//!
//! Two levels: the model as a whole, then individual parameters. Gated
//! parameters are either refused outright (a [`ParamGate`]) or quietly
//! removed when they would expose a field the caller may not see.
//!
//! [`ParamGate`]: crashstats_core::ParamGate

use crate::verdict::Verdict;
use crashstats_core::{
    Caller, ModelDescriptor, ParamMap, ParamValue, PermissionSet, RedactionAction,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Aggregation prefix that exposes a field's distinct-value count
const CARDINALITY_PREFIX: &str = "_cardinality.";

/// Model-level check. The reason names the first missing permission in
/// declared order.
pub fn authorize_model(caller: &Caller, descriptor: &ModelDescriptor) -> Verdict {
    let permissions = caller.effective_permissions();
    descriptor
        .permissions_required
        .iter()
        .find(|p| !permissions.contains(**p))
        .map(|p| Verdict::missing_for_endpoint(*p))
        .unwrap_or_else(Verdict::allow)
}

/// Refuse parameters (or parameter values) gated behind a permission
pub fn authorize_params(
    caller: &Caller,
    descriptor: &ModelDescriptor,
    params: &ParamMap,
) -> Verdict {
    let permissions = caller.effective_permissions();
    for gate in &descriptor.param_gates {
        if permissions.contains(gate.permission) {
            continue;
        }
        let Some(value) = params.get(&gate.param) else {
            continue;
        };
        let triggered = match &gate.value {
            Some(expected) => value.as_strings().iter().any(|v| v == expected),
            None => true,
        };
        if triggered {
            return Verdict::missing_for_param(
                &gate.param,
                gate.value.as_deref(),
                gate.permission,
            );
        }
    }
    Verdict::allow()
}

/// Full check: the model, then its parameters
pub fn authorize(caller: &Caller, descriptor: &ModelDescriptor, params: &ParamMap) -> Verdict {
    match authorize_model(caller, descriptor) {
        Verdict::Allow => authorize_params(caller, descriptor, params),
        forbid => forbid,
    }
}

fn redacted_fields<'a>(
    descriptor: &'a ModelDescriptor,
    permissions: &PermissionSet,
    action: Option<RedactionAction>,
) -> BTreeSet<&'a str> {
    descriptor
        .redaction
        .iter()
        .filter(|rule| action.map_or(true, |a| rule.action == a))
        .filter(|rule| rule.unless.map_or(true, |p| !permissions.contains(p)))
        .flat_map(|rule| rule.fields.iter().map(String::as_str))
        .collect()
}

/// Fields dropped from this caller's view of the model
pub fn hidden_fields<'a>(
    descriptor: &'a ModelDescriptor,
    permissions: &PermissionSet,
) -> BTreeSet<&'a str> {
    redacted_fields(descriptor, permissions, Some(RedactionAction::Drop))
}

/// Fields that may not be named in a facet or aggregation selector: the
/// dropped ones plus the scrubbed ones, whose bucket terms are raw text.
pub fn unselectable_fields<'a>(
    descriptor: &'a ModelDescriptor,
    permissions: &PermissionSet,
) -> BTreeSet<&'a str> {
    redacted_fields(descriptor, permissions, None)
}

fn names_hidden_field(value: &str, hidden: &BTreeSet<&str>) -> bool {
    let field = value.strip_prefix(CARDINALITY_PREFIX).unwrap_or(value);
    hidden.contains(field)
}

/// `_aggs.user_comments` or `_aggs.product.email`: the selector key itself
/// buckets by a field
fn keyed_by_hidden_field(param: &str, hidden: &BTreeSet<&str>) -> bool {
    param.split('.').skip(1).any(|field| hidden.contains(field))
}

/// Remove parameters that would reveal hidden fields: filters on a hidden
/// field, and hidden or scrubbed field names inside facet or aggregation
/// selectors.
///
/// Returns the removed `param` or `param=value` entries.
pub fn filter_restricted_params(
    caller: &Caller,
    descriptor: &ModelDescriptor,
    params: &mut ParamMap,
) -> Vec<String> {
    let permissions = caller.effective_permissions();
    let hidden = hidden_fields(descriptor, &permissions);
    let unselectable = unselectable_fields(descriptor, &permissions);
    if unselectable.is_empty() {
        return Vec::new();
    }

    let mut removed = Vec::new();
    params.retain(|name, value| {
        if hidden.contains(name.as_str()) {
            removed.push(name.clone());
            return false;
        }
        if !descriptor.is_field_selector(name) {
            return true;
        }
        if keyed_by_hidden_field(name, &unselectable) {
            removed.push(name.clone());
            return false;
        }
        match value {
            ParamValue::StrList(items) => {
                items.retain(|item| {
                    let keep = !names_hidden_field(item, &unselectable);
                    if !keep {
                        removed.push(format!("{name}={item}"));
                    }
                    keep
                });
                !items.is_empty()
            }
            ParamValue::Str(item) if names_hidden_field(item, &unselectable) => {
                removed.push(format!("{name}={item}"));
                false
            }
            _ => true,
        }
    });

    if !removed.is_empty() {
        debug!(model = %descriptor.name, removed = ?removed, "Restricted parameters removed");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashstats_core::{Permission, TokenGrant, UserAccount};
    use crashstats_registry::ModelRegistry;
    use std::net::{IpAddr, Ipv4Addr};

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    fn user(permissions: &[Permission]) -> Caller {
        let account = permissions
            .iter()
            .fold(UserAccount::new(1, "test"), |account, p| account.with_permission(*p));
        Caller::User { account, ip: IP }
    }

    fn strings(items: &[&str]) -> ParamValue {
        ParamValue::StrList(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_anonymous_forbidden_from_gated_model() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("CrashesByExploitability").unwrap();

        let verdict = authorize_model(&Caller::anonymous(IP), model);
        let Verdict::Forbid { reason, permission } = verdict else {
            panic!("expected Forbid");
        };
        assert_eq!(permission, Permission::ViewExploitability);
        assert!(reason.contains("View Exploitability Results"));

        assert!(authorize_model(&user(&[Permission::ViewExploitability]), model).is_allowed());
    }

    #[test]
    fn test_first_missing_permission_is_named() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("SuperSearchUnredacted").unwrap();

        let verdict = authorize_model(&user(&[Permission::ViewExploitability]), model);
        assert!(matches!(
            verdict,
            Verdict::Forbid { permission: Permission::ViewPii, .. }
        ));
    }

    #[test]
    fn test_token_intersection_limits_access() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("CrashesByExploitability").unwrap();
        let owner = UserAccount::new(1, "test")
            .with_permission(Permission::ViewPii)
            .with_permission(Permission::ViewExploitability);

        let pii_only = Caller::Token {
            grant: TokenGrant {
                id: 1,
                user: owner.clone(),
                permissions: PermissionSet::new().with(Permission::ViewPii),
                expires_at: None,
                notes: "Only PII token".into(),
            },
            ip: IP,
        };
        assert!(!authorize_model(&pii_only, model).is_allowed());

        let exploitability = Caller::Token {
            grant: TokenGrant {
                id: 2,
                user: owner.clone(),
                permissions: PermissionSet::new().with(Permission::ViewExploitability),
                expires_at: None,
                notes: "Only exploitability token".into(),
            },
            ip: IP,
        };
        assert!(authorize_model(&exploitability, model).is_allowed());

        let inactive = Caller::Token {
            grant: TokenGrant {
                id: 3,
                user: owner.deactivated(),
                permissions: PermissionSet::new().with(Permission::ViewExploitability),
                expires_at: None,
                notes: String::new(),
            },
            ip: IP,
        };
        assert!(!authorize_model(&inactive, model).is_allowed());
    }

    #[test]
    fn test_raw_format_gate() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("RawCrash").unwrap();
        let mut params = ParamMap::new();
        params.insert("crash_id".into(), ParamValue::Str("abc".into()));
        params.insert("format".into(), ParamValue::Str("json".into()));
        assert!(authorize(&Caller::anonymous(IP), model, &params).is_allowed());

        params.insert("format".into(), ParamValue::Str("raw".into()));
        assert!(!authorize(&Caller::anonymous(IP), model, &params).is_allowed());
        // a related permission is not enough
        assert!(!authorize(&user(&[Permission::ViewPii]), model, &params).is_allowed());
        assert!(authorize(&user(&[Permission::ViewRawdump]), model, &params).is_allowed());
    }

    #[test]
    fn test_search_selectors_lose_hidden_fields() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("SuperSearch").unwrap();
        let selector = strings(&["url", "email", "product", "_cardinality.email"]);

        let mut params = ParamMap::new();
        params.insert("exploitability".into(), strings(&["high"]));
        params.insert("_facets".into(), selector.clone());
        params.insert("_aggs.signature".into(), selector.clone());
        params.insert("_histogram.date".into(), selector);
        params.insert("product".into(), strings(&["WaterWolf", "NightTrain"]));

        let removed = filter_restricted_params(&Caller::anonymous(IP), model, &mut params);
        assert!(removed.contains(&"exploitability".to_string()));
        assert!(!params.contains_key("exploitability"));
        for key in ["_facets", "_aggs.signature", "_histogram.date"] {
            assert_eq!(params.get(key), Some(&strings(&["product"])), "{key}");
        }
        assert_eq!(params.get("product"), Some(&strings(&["WaterWolf", "NightTrain"])));
    }

    #[test]
    fn test_selector_emptied_is_removed() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("SuperSearch").unwrap();
        let mut params = ParamMap::new();
        params.insert("_columns".into(), strings(&["email"]));

        filter_restricted_params(&Caller::anonymous(IP), model, &mut params);
        assert!(params.is_empty());
    }

    #[test]
    fn test_unredacted_keeps_everything() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("SuperSearchUnredacted").unwrap();
        let mut params = ParamMap::new();
        params.insert("exploitability".into(), strings(&["high"]));
        params.insert("_facets".into(), strings(&["email"]));

        let removed = filter_restricted_params(&Caller::anonymous(IP), model, &mut params);
        assert!(removed.is_empty());
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_conditional_hidden_fields() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("ProcessedCrash").unwrap();

        let anonymous = hidden_fields(model, &PermissionSet::new());
        assert!(anonymous.contains("exploitability"));
        assert!(anonymous.contains("url"));

        let privileged = hidden_fields(
            model,
            &PermissionSet::new().with(Permission::ViewExploitability),
        );
        assert!(!privileged.contains("exploitability"));
        assert!(privileged.contains("url"));
    }

    #[test]
    fn test_scrubbed_fields_cannot_be_faceted() {
        let registry = ModelRegistry::crashstats();
        let model = registry.lookup("SuperSearch").unwrap();
        assert!(!hidden_fields(model, &PermissionSet::new()).contains("user_comments"));
        assert!(unselectable_fields(model, &PermissionSet::new()).contains("user_comments"));

        let mut params = ParamMap::new();
        params.insert("_facets".into(), strings(&["user_comments", "signature"]));
        params.insert("_aggs.user_comments".into(), strings(&["signature"]));
        params.insert("_aggs.product".into(), strings(&["_cardinality.user_comments"]));
        params.insert("user_comments".into(), strings(&["crash"]));

        let removed = filter_restricted_params(&Caller::anonymous(IP), model, &mut params);
        assert_eq!(params.get("_facets"), Some(&strings(&["signature"])));
        assert!(!params.contains_key("_aggs.user_comments"));
        assert!(!params.contains_key("_aggs.product"));
        // searching the text is fine, only selecting it as a bucket is not
        assert_eq!(params.get("user_comments"), Some(&strings(&["crash"])));
        assert!(removed.contains(&"_facets=user_comments".to_string()));
    }
}
