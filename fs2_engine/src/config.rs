use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fetch::Dispatch;

/// Slots per image layer class.
pub const SLOT_CAPACITY: usize = 10;
pub const CHANNEL_COUNT: usize = 8;
/// One-shot samples always land on the last channel.
pub const PCM_CHANNEL: usize = CHANNEL_COUNT - 1;
/// Render offset applied to every `fw` composite.
pub const FW_OFFSET: (i32, i32) = (90, 160);

pub const IMAGE_EXT: &str = ".hg3";
pub const AUDIO_EXT: &str = ".ogg";
pub const SCRIPT_EXT: &str = ".cst";
/// Loose scripts that are not packed into an archive live here.
pub const SCRIPT_DIR: &str = "scene/";
pub const MANIFEST_NAME: &str = "kif.fs2";
pub const START_SCRIPT: &str = "op_cont2";

/// Runtime settings. Every field has a default so partial JSON files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub asset_root: PathBuf,
    pub manifest: String,
    pub start_script: String,
    /// Background fetch threads; zero reads synchronously on the control thread.
    pub workers: usize,
    pub music_cache_capacity: Option<usize>,
    pub texture_cache_capacity: Option<usize>,
    /// Frames spent cross-fading when a bound slot is rebound. Zero swaps instantly.
    pub transition_frames: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            asset_root: PathBuf::from("assets"),
            manifest: MANIFEST_NAME.to_string(),
            start_script: START_SCRIPT.to_string(),
            workers: 0,
            music_cache_capacity: None,
            texture_cache_capacity: None,
            transition_frames: 0,
            base_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing engine config {}", path.display()))
    }

    pub fn dispatch(&self) -> Dispatch {
        match self.workers {
            0 => Dispatch::Inline,
            n => Dispatch::Workers(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_config_keeps_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{ "start_script": "ev_01", "workers": 2 }}"#)?;

        let config = EngineConfig::from_json_file(file.path())?;
        assert_eq!(config.start_script, "ev_01");
        assert_eq!(config.manifest, MANIFEST_NAME);
        assert_eq!(config.dispatch(), Dispatch::Workers(2));
        assert_eq!(EngineConfig::default().dispatch(), Dispatch::Inline);
        Ok(())
    }

    #[test]
    fn pcm_is_the_last_channel() {
        assert_eq!(PCM_CHANNEL, 7);
    }
}
