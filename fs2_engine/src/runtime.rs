use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use log::warn;
use serde::Serialize;

use crate::audio::RecordingAudioBackend;
use crate::cli::RunArgs;
use crate::codec::MetadataCodec;
use crate::engine::{Backends, Engine};
use crate::interpreter::InterpreterState;
use crate::render::LatestFrameRenderer;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a headless run did before it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSummary {
    pub inputs: usize,
    pub frames: u64,
    pub state: InterpreterState,
    pub script: Option<String>,
    pub position: usize,
    /// `speaker: message` for every page shown, in order.
    pub transcript: Vec<String>,
}

/// Applies completions until the pipeline has nothing left to deliver.
pub fn settle(engine: &mut Engine) {
    loop {
        let applied = engine.wait_idle(SETTLE_TIMEOUT);
        if applied == 0 || engine.in_flight() == 0 {
            break;
        }
    }
}

/// Drives `engine` like a reader who clicks through every page and picks
/// `choices` in order. Stops at the end of the script, when a menu has no
/// choice left to pick, or after `max_inputs`.
pub fn play(
    engine: &mut Engine,
    frames_per_input: u32,
    max_inputs: usize,
    choices: &[usize],
) -> Result<PlaybackSummary> {
    let mut clock = 0u64;
    let mut inputs = 0;
    let mut transcript = Vec::new();
    let mut choices = choices.iter().copied();

    while inputs < max_inputs {
        settle(engine);
        for _ in 0..frames_per_input {
            clock += 1;
            engine.tick(clock);
            engine.render();
        }

        let text = engine.text();
        if !text.message.is_empty() {
            transcript.push(match &text.speaker {
                Some(speaker) => format!("{speaker}: {}", text.message),
                None => text.message.clone(),
            });
        }

        match engine.interpreter().state() {
            InterpreterState::Ended | InterpreterState::Unloaded => break,
            state @ (InterpreterState::Suspended | InterpreterState::Advancing) => {
                warn!("playback stalled while {state:?}; stopping");
                break;
            }
            InterpreterState::AwaitingInput | InterpreterState::Loaded => {}
        }

        inputs += 1;
        if engine.choices().is_empty() {
            engine.advance();
            continue;
        }
        let Some(index) = choices.next() else {
            warn!("menu with {} choices and none left to pick", engine.choices().len());
            break;
        };
        engine.select_choice(index)?;
    }
    settle(engine);

    let interpreter = engine.interpreter();
    Ok(PlaybackSummary {
        inputs,
        frames: clock,
        state: interpreter.state(),
        script: interpreter.name().map(str::to_string),
        position: interpreter.position(),
        transcript,
    })
}

pub fn execute(args: RunArgs) -> Result<()> {
    let RunArgs {
        config,
        frames_per_input,
        max_inputs,
        choices,
        load,
        save,
        audio_log_json,
        frame_json,
        verbose,
    } = args;

    let audio = RecordingAudioBackend::new();
    let renderer = LatestFrameRenderer::new();
    let backends = Backends {
        codec: Box::new(MetadataCodec),
        audio: Box::new(audio.clone()),
        renderer: Box::new(renderer.clone()),
    };
    let mut engine = Engine::open(&config, backends)?;
    println!(
        "Indexed {} assets from {}",
        engine.resolver().manifest().len(),
        config.manifest
    );

    match load.as_deref() {
        Some(path) => engine.load_from(path)?,
        None => engine
            .start(&config.start_script)
            .with_context(|| format!("starting script {}", config.start_script))?,
    }

    let summary = play(&mut engine, frames_per_input, max_inputs, &choices)?;
    if verbose {
        for line in &summary.transcript {
            println!("  {line}");
        }
    }
    println!(
        "Played {} inputs over {} frames; {} at {} ({:?})",
        summary.inputs,
        summary.frames,
        summary.script.as_deref().unwrap_or("<no script>"),
        summary.position,
        summary.state
    );

    if let Some(path) = save.as_deref() {
        engine.save_to(path)?;
        println!("Saved session snapshot to {}", path.display());
    }
    if let Some(path) = audio_log_json.as_deref() {
        write_json(path, &audio.events()).context("writing audio event log")?;
        println!("Saved audio event log to {}", path.display());
    }
    if let Some(path) = frame_json.as_deref() {
        write_json(path, &renderer.last()).context("writing frame log")?;
        println!("Saved last frame to {}", path.display());
    }
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}
