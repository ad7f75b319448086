//! Knowledge-base descriptors.
//!
//! The core never fetches data itself; a `KbInfo` is passed through to
//! whatever loads the `Cache` and to the atomic mappers. Only `var` is read
//! here (to strip `x.` / `?x.` prefixes from property paths).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbInfo {
    pub id: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    /// Variable bound to this knowledge base in specifications, e.g. `?x`.
    pub var: String,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub optional_properties: Vec<String>,
    #[serde(default)]
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
    /// Page size for paged endpoints; `-1` fetches everything at once.
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default = "default_kind")]
    pub kind: String,
}

fn default_page_size() -> i64 {
    -1
}

fn default_kind() -> String {
    "sparql".to_string()
}

impl KbInfo {
    pub fn new(id: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: String::new(),
            graph: None,
            var: var.into(),
            properties: Vec::new(),
            optional_properties: Vec::new(),
            restrictions: Vec::new(),
            prefixes: BTreeMap::new(),
            page_size: default_page_size(),
            kind: default_kind(),
        }
    }

    /// The variable name without a leading `?`.
    pub fn bare_var(&self) -> &str {
        self.var.trim_start_matches('?')
    }
}
