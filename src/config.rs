// ⚙️ Loader configuration - policy overrides as data
//
// Example:
// {
//   "scopes": { "Gene": "run" },
//   "relationships": { "Gene.alleles": "set" },
//   "row_limit": 5000
// }

use crate::schema::{Membership, ScopeLevel};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Kind name -> interning scope override
    pub scopes: BTreeMap<String, ScopeLevel>,

    /// `Owner.relationship` -> membership override
    pub relationships: BTreeMap<String, Membership>,

    /// Stop reading a file after this many records
    pub row_limit: Option<usize>,
}

impl LoaderConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse config JSON")
    }
}
