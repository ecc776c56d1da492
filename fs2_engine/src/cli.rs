use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(
    about = "Headless CatScene player: runs a scene script against an archive set",
    version
)]
pub struct Args {
    /// JSON engine configuration; flags below override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the manifest, archives and loose scene files
    #[arg(long)]
    pub asset_root: Option<PathBuf>,

    /// Manifest path relative to the asset root
    #[arg(long)]
    pub manifest: Option<String>,

    /// Fetch assets from this URL instead of the asset root (needs the `network` feature)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Script to start from
    #[arg(long)]
    pub script: Option<String>,

    /// Reader threads; 0 performs every read inline
    #[arg(long)]
    pub workers: Option<usize>,

    /// Frames to tick after every input
    #[arg(long, default_value_t = 60)]
    pub frames: u32,

    /// Stop after this many inputs
    #[arg(long, default_value_t = 1000)]
    pub max_inputs: usize,

    /// Choice to pick at each menu, in order (repeatable)
    #[arg(long = "choose", value_name = "INDEX")]
    pub choices: Vec<usize>,

    /// Resume from a session snapshot instead of starting the script
    #[arg(long)]
    pub load: Option<PathBuf>,

    /// Write a session snapshot when playback stops
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Path to write the audio event log as JSON
    #[arg(long)]
    pub audio_log_json: Option<PathBuf>,

    /// Path to write the last rendered frame as JSON
    #[arg(long)]
    pub frame_json: Option<PathBuf>,

    /// Print dialogue as it is shown
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug)]
pub struct RunArgs {
    pub config: EngineConfig,
    pub frames_per_input: u32,
    pub max_inputs: usize,
    pub choices: Vec<usize>,
    pub load: Option<PathBuf>,
    pub save: Option<PathBuf>,
    pub audio_log_json: Option<PathBuf>,
    pub frame_json: Option<PathBuf>,
    pub verbose: bool,
}

pub fn parse() -> Result<RunArgs> {
    RunArgs::from_args(Args::parse())
}

impl RunArgs {
    pub fn from_args(args: Args) -> Result<Self> {
        if args.load.is_some() && args.script.is_some() {
            bail!("--script cannot be combined with --load");
        }
        if args.max_inputs == 0 {
            bail!("--max-inputs must be at least 1");
        }

        let mut config = match args.config.as_deref() {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("loading engine config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(root) = args.asset_root {
            config.asset_root = root;
        }
        if let Some(manifest) = args.manifest {
            config.manifest = manifest;
        }
        if let Some(url) = args.base_url {
            config.base_url = Some(url);
        }
        if let Some(script) = args.script {
            config.start_script = script;
        }
        if let Some(workers) = args.workers {
            config.workers = workers;
        }

        Ok(RunArgs {
            config,
            frames_per_input: args.frames,
            max_inputs: args.max_inputs,
            choices: args.choices,
            load: args.load,
            save: args.save,
            audio_log_json: args.audio_log_json,
            frame_json: args.frame_json,
            verbose: args.verbose,
        })
    }
}
