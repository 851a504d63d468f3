//! Post-hoc redaction of successful backend results
use crate::scrub::scrub_text;
use crashstats_core::{ModelDescriptor, PermissionSet, RedactionAction};
use serde_json::Value;
use std::collections::BTreeSet;

/// The fields one caller may not see as-is, resolved from a model's rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRedaction {
    pub drop: BTreeSet<String>,
    pub scrub: BTreeSet<String>,
}

impl FieldRedaction {
    pub fn for_caller(descriptor: &ModelDescriptor, permissions: &PermissionSet) -> Self {
        let mut redaction = Self::default();
        for rule in &descriptor.redaction {
            if rule.unless.is_some_and(|p| permissions.contains(p)) {
                continue;
            }
            let target = match rule.action {
                RedactionAction::Drop => &mut redaction.drop,
                RedactionAction::Scrub => &mut redaction.scrub,
            };
            target.extend(rule.fields.iter().cloned());
        }
        redaction
    }

    pub fn is_empty(&self) -> bool {
        self.drop.is_empty() && self.scrub.is_empty()
    }

    pub fn keeps_key(&self, key: &str) -> bool {
        !self.drop.contains(key)
    }

    /// Apply to every object at any depth
    pub fn apply(&self, value: &Value) -> Value {
        self.walk(value, false)
    }

    /// Below a scrubbed key every string is scrubbed, so facet buckets of
    /// free-text fields are covered as well as the field itself.
    fn walk(&self, value: &Value, scrubbing: bool) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    if !self.keeps_key(k) {
                        continue;
                    }
                    let scrub = scrubbing || self.scrub.contains(k);
                    out.insert(k.clone(), self.walk(v, scrub));
                }
                Value::Object(out)
            }
            Value::Array(values) => {
                Value::Array(values.iter().map(|v| self.walk(v, scrubbing)).collect())
            }
            Value::String(text) if scrubbing => Value::String(scrub_text(text)),
            _ => value.clone(),
        }
    }
}

/// Redact a backend result for a caller holding `permissions`.
///
/// Models without redaction rules, and bare scalars such as `null`, are
/// returned untouched.
pub fn redact(descriptor: &ModelDescriptor, permissions: &PermissionSet, result: Value) -> Value {
    let redaction = FieldRedaction::for_caller(descriptor, permissions);
    if redaction.is_empty() {
        return result;
    }
    redaction.apply(&result)
}
