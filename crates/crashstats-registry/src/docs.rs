//! Documentation entries served by the API index
use crashstats_core::{ModelDescriptor, ParamSpec};
use serde::Serialize;

/// Indentation used inside catalogue descriptions
const DESCRIPTION_INDENT: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct ModelDoc {
    pub name: String,
    pub url: String,
    pub description: String,
    pub methods: Vec<&'static str>,
    pub required_params: Vec<ParamSpec>,
    pub optional_params: Vec<ParamSpec>,
    pub accepts_any_param: bool,
    /// Display names of the permissions required
    pub permissions: Vec<&'static str>,
    pub cache_seconds: u64,
}

impl ModelDoc {
    pub fn from_descriptor(descriptor: &ModelDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            url: format!("/api/{}/", descriptor.name),
            description: dedent_left(&descriptor.description, DESCRIPTION_INDENT),
            methods: descriptor.methods().to_vec(),
            required_params: descriptor.required_params.clone(),
            optional_params: descriptor.optional_params.clone(),
            accepts_any_param: descriptor.open_params,
            permissions: descriptor
                .permissions_required
                .iter()
                .map(|p| p.name())
                .collect(),
            cache_seconds: descriptor.cache_seconds,
        }
    }
}

/// Remove at most `spaces` leading spaces from every line
pub fn dedent_left(text: &str, spaces: usize) -> String {
    text.lines()
        .map(|line| {
            let leading = line.len() - line.trim_start_matches(' ').len();
            &line[leading.min(spaces)..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}
