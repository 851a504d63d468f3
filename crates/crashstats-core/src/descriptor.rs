//! Model descriptors: one data record per exposed model.
//!
//! The dispatcher is a single interpreter over these records; nothing about
//! an individual model lives in code paths of its own.

use crate::backend::BackendParams;
use crate::params::{ParamMap, ParamSpec};
use crate::permission::Permission;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Read-only; answered on GET or POST
    Query,
    /// Mutating; POST only
    Action,
}

/// Supplying `param` (optionally with a specific value) requires `permission`;
/// callers without it are refused outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamGate {
    pub param: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub permission: Permission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionAction {
    /// Remove the field entirely
    Drop,
    /// Keep the field, strip emails and URLs from its text
    Scrub,
}

/// A group of sensitive fields and what happens to them.
///
/// With `unless` set, callers holding that permission see the fields as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedactionRule {
    pub fields: Vec<String>,
    pub action: RedactionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unless: Option<Permission>,
}

/// How a binary backend payload is offered for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryAttachment {
    /// Parameter whose value names the file
    pub id_param: String,
    pub extension: String,
    /// Parameter and value that select the binary representation
    pub trigger_param: String,
    pub trigger_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub description: String,
    pub kind: ModelKind,
    /// Path segment of the backend service answering this model
    pub backend_endpoint: String,
    pub required_params: Vec<ParamSpec>,
    pub optional_params: Vec<ParamSpec>,
    /// Accept any undeclared parameter as a list of strings
    pub open_params: bool,
    /// Fixed parameters always sent to the backend
    pub implicit_params: BTreeMap<String, Value>,
    pub permissions_required: Vec<Permission>,
    pub param_gates: Vec<ParamGate>,
    pub redaction: Vec<RedactionRule>,
    /// Parameters whose values name result fields (facets, aggregations).
    /// An entry ending in `.` matches every parameter with that prefix.
    pub field_selector_params: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryAttachment>,
    pub cache_seconds: u64,
    #[serde(skip)]
    pub is_addressable: bool,
}

impl ModelDescriptor {
    fn new(name: impl Into<String>, kind: ModelKind, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            backend_endpoint: endpoint.into(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
            open_params: false,
            implicit_params: BTreeMap::new(),
            permissions_required: Vec::new(),
            param_gates: Vec::new(),
            redaction: Vec::new(),
            field_selector_params: Vec::new(),
            binary: None,
            cache_seconds: 0,
            is_addressable: true,
        }
    }

    /// A read-only model
    pub fn query(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, ModelKind::Query, endpoint)
    }

    /// A POST-only model that performs an action
    pub fn action(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, ModelKind::Action, endpoint)
    }

    /// A registered base record that must never be served
    pub fn internal(name: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name, ModelKind::Query, "");
        descriptor.is_addressable = false;
        descriptor
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_required(mut self, spec: ParamSpec) -> Self {
        self.required_params.push(spec);
        self
    }

    pub fn with_optional(mut self, spec: ParamSpec) -> Self {
        self.optional_params.push(spec);
        self
    }

    pub fn with_open_params(mut self) -> Self {
        self.open_params = true;
        self
    }

    pub fn with_implicit(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.implicit_params.insert(name.into(), value.into());
        self
    }

    pub fn requires(mut self, permission: Permission) -> Self {
        self.permissions_required.push(permission);
        self
    }

    pub fn with_gate(
        mut self,
        param: impl Into<String>,
        value: Option<&str>,
        permission: Permission,
    ) -> Self {
        self.param_gates.push(ParamGate {
            param: param.into(),
            value: value.map(str::to_string),
            permission,
        });
        self
    }

    fn with_rule(
        mut self,
        fields: &[&str],
        action: RedactionAction,
        unless: Option<Permission>,
    ) -> Self {
        self.redaction.push(RedactionRule {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            action,
            unless,
        });
        self
    }

    pub fn drop_fields(self, fields: &[&str]) -> Self {
        self.with_rule(fields, RedactionAction::Drop, None)
    }

    pub fn drop_fields_unless(self, fields: &[&str], permission: Permission) -> Self {
        self.with_rule(fields, RedactionAction::Drop, Some(permission))
    }

    pub fn scrub_fields(self, fields: &[&str]) -> Self {
        self.with_rule(fields, RedactionAction::Scrub, None)
    }

    pub fn with_field_selectors(mut self, params: &[&str]) -> Self {
        self.field_selector_params
            .extend(params.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_binary(
        mut self,
        id_param: &str,
        extension: &str,
        trigger_param: &str,
        trigger_value: &str,
    ) -> Self {
        self.binary = Some(BinaryAttachment {
            id_param: id_param.to_string(),
            extension: extension.to_string(),
            trigger_param: trigger_param.to_string(),
            trigger_value: trigger_value.to_string(),
        });
        self
    }

    pub fn cache_for(mut self, seconds: u64) -> Self {
        self.cache_seconds = seconds;
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.required_params
            .iter()
            .chain(self.optional_params.iter())
            .find(|spec| spec.name == name)
    }

    /// No permission is needed to call this model
    pub fn is_public(&self) -> bool {
        self.permissions_required.is_empty()
    }

    /// Responses may be shared between callers: the model is a public
    /// query and its redaction does not depend on who is asking.
    pub fn is_cacheable(&self) -> bool {
        self.cache_seconds > 0
            && self.kind == ModelKind::Query
            && self.is_public()
            && self.redaction.iter().all(|rule| rule.unless.is_none())
    }

    /// HTTP methods this model answers
    pub fn methods(&self) -> &'static [&'static str] {
        match self.kind {
            ModelKind::Query => &["GET", "POST"],
            ModelKind::Action => &["POST"],
        }
    }

    /// True when a field selector parameter of this model matches `param`
    pub fn is_field_selector(&self, param: &str) -> bool {
        self.field_selector_params.iter().any(|selector| {
            if selector.ends_with('.') {
                param.starts_with(selector.as_str())
            } else {
                param == selector
            }
        })
    }

    /// True when the validated params ask for the binary representation
    pub fn wants_binary(&self, params: &ParamMap) -> bool {
        self.binary.as_ref().is_some_and(|binary| {
            params
                .get(&binary.trigger_param)
                .is_some_and(|v| v.as_strings().iter().any(|s| *s == binary.trigger_value))
        })
    }

    /// Download filename for a binary response, e.g. `abc.dmp`
    pub fn attachment_filename(&self, params: &ParamMap) -> Option<String> {
        let binary = self.binary.as_ref()?;
        let id = params.get(&binary.id_param)?.as_strings().into_iter().next()?;
        Some(format!("{}.{}", id, binary.extension))
    }

    /// Translate validated params into what the backend expects:
    /// renamed where declared, plus the implicit parameters.
    pub fn backend_params(&self, params: &ParamMap) -> BackendParams {
        let mut out = BackendParams::new();
        for (name, value) in params {
            let backend_name = self
                .param_spec(name)
                .map(|spec| spec.backend_name().to_string())
                .unwrap_or_else(|| name.clone());
            out.insert(backend_name, value.to_json());
        }
        for (name, value) in &self.implicit_params {
            out.insert(name.clone(), value.clone());
        }
        out
    }
}
