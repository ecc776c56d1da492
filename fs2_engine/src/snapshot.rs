use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::expr::Variables;
use crate::image::ImageClass;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSnapshot {
    pub name: String,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicSnapshot {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSnapshot {
    pub name: String,
    pub x: i32,
    pub y: i32,
}

/// Minimal resumable state. Only authoritative bindings are kept: animation
/// phase and transient (finite-loop) effects are not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub music: Option<MusicSnapshot>,
    /// Channel index to the effect looping on it.
    #[serde(rename = "se", skip_serializing_if = "BTreeMap::is_empty")]
    pub effects: BTreeMap<usize, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub images: BTreeMap<ImageClass, BTreeMap<usize, ImageSnapshot>>,
    #[serde(skip_serializing_if = "Variables::is_empty")]
    pub variables: Variables,
}

impl SessionSnapshot {
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| EngineError::Snapshot(err.to_string()))
    }

    pub fn from_json(data: &str) -> EngineResult<Self> {
        serde_json::from_str(data).map_err(|err| EngineError::Snapshot(err.to_string()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)
            .with_context(|| format!("writing session snapshot to {}", path.display()))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading session snapshot {}", path.display()))?;
        Self::from_json(&data)
            .with_context(|| format!("parsing session snapshot {}", path.display()))
    }
}
