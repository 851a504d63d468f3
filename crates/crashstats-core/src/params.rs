//! Parameter declarations and the validating coercer.
//!
//! Raw query-string or form pairs go in, typed values come out. Every
//! declared parameter is checked before anything is returned, so a single
//! 400 response lists all bad fields at once.

use crate::descriptor::ModelDescriptor;
use crate::error::FieldErrors;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const MSG_REQUIRED: &str = "This field is required.";
pub const MSG_INVALID_DATE: &str = "Enter a valid date.";
pub const MSG_INVALID_INT: &str = "Enter a whole number.";
pub const MSG_INVALID_BOOL: &str = "Enter a valid boolean.";
pub const MSG_INVALID_INT_LIST: &str = "Enter a list of whole numbers.";

/// Accepted input date formats, tried in order
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Canonical output date format
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// How a raw string is turned into a typed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Int,
    Bool,
    Date,
    StringList,
    IntList,
    Choice { choices: Vec<String> },
}

impl ParamKind {
    pub fn choice(choices: &[&str]) -> Self {
        ParamKind::Choice {
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ParamKind::StringList | ParamKind::IntList)
    }
}

/// Value used when an optional parameter is absent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamDefault {
    Int(i64),
    Str(String),
    /// The deployment's configured default product
    DefaultProduct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamDefault>,
    /// Name the backend knows this parameter by, when it differs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded_as: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            forwarded_as: None,
        }
    }

    pub fn with_default(mut self, default: ParamDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn forwarded_as(mut self, name: impl Into<String>) -> Self {
        self.forwarded_as = Some(name.into());
        self
    }

    /// Name used when handing the value to the backend
    pub fn backend_name(&self) -> &str {
        self.forwarded_as.as_deref().unwrap_or(&self.name)
    }
}

/// A coerced parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Date(NaiveDate),
    StrList(Vec<String>),
    IntList(Vec<i64>),
}

impl ParamValue {
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Int(i) => Value::from(*i),
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            ParamValue::StrList(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            ParamValue::IntList(items) => {
                Value::Array(items.iter().map(|i| Value::from(*i)).collect())
            }
        }
    }

    /// String form of every element, for matching against field names
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            ParamValue::Str(s) => vec![s.clone()],
            ParamValue::StrList(items) => items.clone(),
            ParamValue::IntList(items) => items.iter().map(|i| i.to_string()).collect(),
            other => match other.to_json() {
                Value::String(s) => vec![s],
                v => vec![v.to_string()],
            },
        }
    }
}

/// Validated parameters, keyed by public parameter name
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Raw, possibly repeated, request parameters in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    pairs: Vec<(String, String)>,
}

impl RawParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn extend(&mut self, other: RawParams) {
        self.pairs.extend(other.pairs);
    }

    /// Non-blank values for `name`, trimmed
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn last(&self, name: &str) -> Option<&str> {
        self.values(name).last().copied()
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.pairs.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Deployment-specific inputs to validation
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub default_product: String,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            default_product: "WaterWolf".to_string(),
        }
    }
}

/// Validate and coerce `raw` against the descriptor's declared parameters.
///
/// Returns every field error found, never just the first one.
pub fn validate(
    descriptor: &ModelDescriptor,
    raw: &RawParams,
    ctx: &ValidationContext,
) -> Result<ParamMap, FieldErrors> {
    let mut values = ParamMap::new();
    let mut errors = FieldErrors::new();

    let declared = descriptor
        .required_params
        .iter()
        .map(|spec| (spec, true))
        .chain(descriptor.optional_params.iter().map(|spec| (spec, false)));

    for (spec, required) in declared {
        match coerce(spec, &raw.values(&spec.name), required, ctx) {
            Ok(Some(value)) => {
                values.insert(spec.name.clone(), value);
            }
            Ok(None) => {}
            Err(message) => errors.add(spec.name.clone(), message),
        }
    }

    if descriptor.open_params {
        for name in raw.names() {
            if descriptor.param_spec(name).is_some() {
                continue;
            }
            let supplied = raw.values(name);
            if !supplied.is_empty() {
                values.insert(
                    name.to_string(),
                    ParamValue::StrList(supplied.into_iter().map(str::to_string).collect()),
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn coerce(
    spec: &ParamSpec,
    supplied: &[&str],
    required: bool,
    ctx: &ValidationContext,
) -> Result<Option<ParamValue>, String> {
    let Some(last) = supplied.last().copied() else {
        if required {
            return Err(MSG_REQUIRED.to_string());
        }
        return Ok(spec.default.as_ref().map(|d| default_value(&spec.kind, d, ctx)));
    };

    let value = match &spec.kind {
        ParamKind::String => ParamValue::Str(last.to_string()),
        ParamKind::Int => ParamValue::Int(parse_int(last).ok_or(MSG_INVALID_INT)?),
        ParamKind::Bool => ParamValue::Bool(parse_bool(last).ok_or(MSG_INVALID_BOOL)?),
        ParamKind::Date => ParamValue::Date(parse_date(last).ok_or(MSG_INVALID_DATE)?),
        ParamKind::StringList => {
            ParamValue::StrList(supplied.iter().map(|v| v.to_string()).collect())
        }
        ParamKind::IntList => ParamValue::IntList(
            supplied
                .iter()
                .map(|v| parse_int(v))
                .collect::<Option<Vec<_>>>()
                .ok_or(MSG_INVALID_INT_LIST)?,
        ),
        ParamKind::Choice { choices } => {
            if !choices.iter().any(|c| c == last) {
                return Err(format!(
                    "Select a valid choice. {} is not one of the available choices.",
                    last
                ));
            }
            ParamValue::Str(last.to_string())
        }
    };

    Ok(Some(value))
}

fn default_value(kind: &ParamKind, default: &ParamDefault, ctx: &ValidationContext) -> ParamValue {
    let text = match default {
        ParamDefault::Int(i) => return ParamValue::Int(*i),
        ParamDefault::Str(s) => s.clone(),
        ParamDefault::DefaultProduct => ctx.default_product.clone(),
    };
    if kind.is_list() {
        ParamValue::StrList(vec![text])
    } else {
        ParamValue::Str(text)
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a human date such as `2012-1-1` or `01/31/2012`
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}
