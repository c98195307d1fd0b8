use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    #[default]
    Web,
    #[serde(other)]
    Unknown,
}

impl Platform {
    pub fn is_native(self) -> bool {
        matches!(self, Platform::Ios | Platform::Android)
    }
}

/// Describes the compilation a file is part of. Hosts usually pass this as
/// JSON alongside the source text.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Caller {
    pub platform: Platform,
    pub is_dev: bool,
    pub is_server: bool,
    pub is_react_server: bool,
    pub is_node_module: bool,
    #[serde(rename = "supportsStaticESM")]
    pub supports_static_esm: bool,
    pub project_root: Option<PathBuf>,
}

impl Caller {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to deserialize transform caller")
    }
}
