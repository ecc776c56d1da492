use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::archive::ArchiveResolver;
use crate::audio::{AudioBackend, AudioChannelManager, RecordingAudioBackend, LOOP_FOREVER};
use crate::cache::AssetCache;
use crate::codec::{DecodedImage, ImageCodec, MetadataCodec};
use crate::command::{composite_parts, Command};
use crate::config::{EngineConfig, AUDIO_EXT, IMAGE_EXT, PCM_CHANNEL, SCRIPT_DIR, SCRIPT_EXT};
use crate::error::{EngineError, EngineResult};
use crate::expr::Variables;
use crate::fetch::{ByteSource, Completion, Dispatch, FetchPipeline, LocalSource};
use crate::image::{ImageClass, ImageLayers};
use crate::interpreter::{Flow, Interpreter, InterpreterState, ScriptSink};
use crate::render::{ChoiceView, Frame, RecordingRenderer, RenderBackend};
use crate::snapshot::{ImageSnapshot, MusicSnapshot, ScriptSnapshot, SessionSnapshot};

/// External collaborators the engine drives.
pub struct Backends {
    pub codec: Box<dyn ImageCodec>,
    pub audio: Box<dyn AudioBackend>,
    pub renderer: Box<dyn RenderBackend>,
}

impl Default for Backends {
    fn default() -> Self {
        Backends {
            codec: Box::new(MetadataCodec),
            audio: Box::new(RecordingAudioBackend::new()),
            renderer: Box::new(RecordingRenderer::new()),
        }
    }
}

/// Context carried by every fetch, snapshotting the binding it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetTag {
    Script {
        name: String,
        resume_at: Option<usize>,
    },
    Image {
        class: ImageClass,
        slot: usize,
        part: usize,
        name: String,
    },
    Music {
        name: String,
    },
    Effect {
        channel: usize,
        name: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextState {
    pub speaker: Option<String>,
    pub message: String,
}

impl TextState {
    fn clear(&mut self) {
        self.speaker = None;
        self.message.clear();
    }
}

fn image_file(name: &str) -> String {
    format!("{name}{IMAGE_EXT}")
}

fn audio_file(name: &str) -> String {
    format!("{name}{AUDIO_EXT}")
}

/// Everything the interpreter talks to while it drains records.
struct Stage {
    resolver: ArchiveResolver,
    pipeline: FetchPipeline<AssetTag>,
    codec: Box<dyn ImageCodec>,
    renderer: Box<dyn RenderBackend>,
    textures: AssetCache<DecodedImage>,
    images: ImageLayers,
    audio: AudioChannelManager,
    variables: Variables,
    text: TextState,
    choices: Vec<ChoiceView>,
    pending_script: Option<String>,
    /// Script whose fetch is authoritative, with the record it resumes at.
    script_target: Option<(String, Option<usize>)>,
    now: u64,
}

impl Stage {
    fn request_script(&mut self, name: &str, resume_at: Option<usize>) -> EngineResult<()> {
        self.script_target = Some((name.to_string(), resume_at));
        let tag = AssetTag::Script {
            name: name.to_string(),
            resume_at,
        };
        let packed = format!("{name}{SCRIPT_EXT}");
        if self.resolver.contains(&packed) {
            return self
                .resolver
                .fetch_and_decrypt(&packed, tag, &mut self.pipeline);
        }
        self.pipeline
            .fetch(format!("{SCRIPT_DIR}{name}{SCRIPT_EXT}"), None, tag);
        Ok(())
    }

    fn play_music(&mut self, name: &str) -> EngineResult<()> {
        let file = audio_file(name);
        if !self.resolver.contains(&file) {
            return Err(EngineError::NotFound(file));
        }
        if self.audio.set_music(name) {
            let tag = AssetTag::Music {
                name: name.to_string(),
            };
            self.resolver
                .fetch_and_decrypt(&file, tag, &mut self.pipeline)?;
        }
        Ok(())
    }

    fn play_effect(&mut self, channel: usize, name: &str, loops: i32) -> EngineResult<()> {
        let file = audio_file(name);
        if !self.resolver.contains(&file) {
            return Err(EngineError::NotFound(file));
        }
        if channel == PCM_CHANNEL {
            self.audio.set_pcm(name)?;
        } else {
            self.audio.set_effect(name, channel, loops)?;
        }
        let tag = AssetTag::Effect {
            channel,
            name: name.to_string(),
        };
        self.resolver
            .fetch_and_decrypt(&file, tag, &mut self.pipeline)
    }

    fn bind_image(
        &mut self,
        class: ImageClass,
        slot: usize,
        asset: &str,
        shift: (i32, i32),
    ) -> EngineResult<()> {
        self.images.slot(class, slot)?;

        let names: Vec<Option<String>> = if class.is_composite() {
            let Some(parts) = composite_parts(asset) else {
                warn!("invalid {} arguments '{asset}'", class.key());
                return Ok(());
            };
            parts
                .into_iter()
                .map(|name| self.resolver.contains(&image_file(&name)).then_some(name))
                .collect()
        } else {
            vec![self
                .resolver
                .contains(&image_file(asset))
                .then(|| asset.to_string())]
        };
        if names.iter().all(Option::is_none) {
            return Err(EngineError::NotFound(image_file(asset)));
        }

        let textures = &self.textures;
        let fetches = self.images.update(
            class,
            slot,
            asset,
            names,
            shift,
            self.now,
            |name| textures.contains(name),
        )?;
        for (part, name) in fetches {
            let file = image_file(&name);
            let tag = AssetTag::Image {
                class,
                slot,
                part,
                name,
            };
            self.resolver
                .fetch_and_decrypt(&file, tag, &mut self.pipeline)?;
        }
        Ok(())
    }

    fn offset(&mut self, text: &str) -> i32 {
        match self.variables.eval(text) {
            Ok(value) => value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            Err(err) => {
                warn!("offset '{text}' did not evaluate ({err}); using 0");
                0
            }
        }
    }

    fn apply(&mut self, command: Command) -> EngineResult<Flow> {
        match command {
            Command::Pcm(name) => self.play_effect(PCM_CHANNEL, &name, 0)?,
            Command::Music { name, .. } => self.play_music(&name)?,
            Command::Effect {
                channel,
                name: Some(name),
                loops,
            } => self.play_effect(channel, &name, loops)?,
            Command::Effect {
                channel,
                name: None,
                ..
            } => self.audio.stop_channel(channel)?,
            Command::ClearClass(class) => self.images.clear_class(class),
            Command::ClearSlot(class, slot) => self.images.clear_slot(class, slot)?,
            Command::BindImage {
                class,
                slot,
                asset,
                x,
                y,
            } => {
                let shift = (self.offset(&x), self.offset(&y));
                self.bind_image(class, slot, &asset, shift)?;
            }
            Command::Fade {
                class,
                slot,
                frames,
                from,
                to,
            } => self.images.fade(class, slot, self.now, frames, from, to)?,
            Command::Move {
                class,
                slot,
                frames,
                x,
                y,
            } => self.images.move_to(class, slot, self.now, frames, (x, y))?,
            Command::Blend { class, slot, alpha } => self.images.blend(class, slot, alpha)?,
            Command::Next(name) => {
                self.pending_script = Some(name);
                return Ok(Flow::Suspend);
            }
            Command::Choice { target, prompt } => self.choices.push(ChoiceView { target, prompt }),
            Command::If { condition, then } => match self.variables.eval(&condition) {
                Ok(1) => return self.apply(*then),
                Ok(_) => {}
                Err(err) => warn!("condition '{condition}' did not evaluate: {err}"),
            },
            Command::Eval(expression) => {
                if let Err(err) = self.variables.eval(&expression) {
                    warn!("expression '{expression}' did not evaluate: {err}");
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn apply_asset(&mut self, tag: AssetTag, bytes: Vec<u8>) -> bool {
        match tag {
            AssetTag::Image {
                class,
                slot,
                part,
                name,
            } => {
                if !self.textures.contains(&name) {
                    match self.codec.decode(&bytes) {
                        Ok(image) => {
                            self.textures.insert_if_absent(&name, image);
                        }
                        Err(err) => {
                            warn!("dropping image {name}: {err}");
                            return false;
                        }
                    }
                }
                self.images.deliver(class, slot, part, &name)
            }
            AssetTag::Music { name } => self.audio.deliver_music(&name, bytes),
            AssetTag::Effect { channel, name } => self.audio.deliver_effect(channel, &name, &bytes),
            AssetTag::Script { .. } => false,
        }
    }
}

impl ScriptSink for Stage {
    fn message(&mut self, text: &str) {
        self.text.message.push_str(text);
    }

    fn speaker(&mut self, name: &str) {
        self.text.speaker = Some(name.to_string());
    }

    fn command(&mut self, text: &str) -> Flow {
        debug!("command: {text}");
        let Some(command) = Command::parse(text) else {
            debug!("ignoring unrecognized command '{text}'");
            return Flow::Continue;
        };
        match self.apply(command) {
            Ok(flow) => flow,
            Err(err) => {
                warn!("command '{text}' failed: {err}");
                Flow::Continue
            }
        }
    }
}

/// Scene playback session: owns the interpreter, every presentation
/// subsystem and the caches, and routes fetch completions back into them.
///
/// Completions are only applied inside [`Engine::pump`] (or
/// [`Engine::wait_idle`]), so all state changes happen on the caller's thread.
pub struct Engine {
    interpreter: Interpreter,
    stage: Stage,
}

impl Engine {
    pub fn new(
        source: Arc<dyn ByteSource>,
        resolver: ArchiveResolver,
        dispatch: Dispatch,
        config: &EngineConfig,
        backends: Backends,
    ) -> Self {
        let Backends {
            codec,
            audio,
            renderer,
        } = backends;
        Engine {
            interpreter: Interpreter::new(),
            stage: Stage {
                resolver,
                pipeline: FetchPipeline::new(source, dispatch),
                codec,
                renderer,
                textures: AssetCache::new(config.texture_cache_capacity),
                images: ImageLayers::new(config.transition_frames),
                audio: AudioChannelManager::new(audio, config.music_cache_capacity),
                variables: Variables::new(),
                text: TextState::default(),
                choices: Vec::new(),
                pending_script: None,
                script_target: None,
                now: 0,
            },
        }
    }

    /// Builds the byte source named by `config` and indexes its manifest.
    pub fn open(config: &EngineConfig, backends: Backends) -> Result<Self> {
        let source = open_source(config)?;
        let resolver = ArchiveResolver::load(source.as_ref(), &config.manifest)
            .with_context(|| format!("loading archive manifest {}", config.manifest))?;
        Ok(Self::new(
            source,
            resolver,
            config.dispatch(),
            config,
            backends,
        ))
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn images(&self) -> &ImageLayers {
        &self.stage.images
    }

    pub fn audio(&self) -> &AudioChannelManager {
        &self.stage.audio
    }

    pub fn variables(&self) -> &Variables {
        &self.stage.variables
    }

    pub fn text(&self) -> &TextState {
        &self.stage.text
    }

    pub fn choices(&self) -> &[ChoiceView] {
        &self.stage.choices
    }

    pub fn resolver(&self) -> &ArchiveResolver {
        &self.stage.resolver
    }

    pub fn pipeline_mut(&mut self) -> &mut FetchPipeline<AssetTag> {
        &mut self.stage.pipeline
    }

    pub fn in_flight(&self) -> usize {
        self.stage.pipeline.in_flight()
    }

    /// Fetches `name` and starts playing it once it arrives.
    pub fn start(&mut self, name: &str) -> EngineResult<()> {
        self.stage.request_script(name, None)
    }

    /// Applies every completion that has arrived. Returns how many changed
    /// state; stale ones are dropped silently.
    pub fn pump(&mut self) -> usize {
        let completions = self.stage.pipeline.poll();
        self.apply_completions(completions)
    }

    /// Like [`Engine::pump`] but blocks until outstanding reads settle.
    pub fn wait_idle(&mut self, timeout: Duration) -> usize {
        let completions = self.stage.pipeline.wait(timeout);
        self.apply_completions(completions)
    }

    fn apply_completions(&mut self, completions: Vec<Completion<AssetTag>>) -> usize {
        let mut applied = 0;
        for completion in completions {
            let applied_one = match completion.context {
                AssetTag::Script { name, resume_at } => {
                    self.finish_script_load(&name, resume_at, &completion.bytes)
                }
                tag => self.stage.apply_asset(tag, completion.bytes),
            };
            if applied_one {
                applied += 1;
            }
        }
        applied
    }

    fn finish_script_load(&mut self, name: &str, resume_at: Option<usize>, bytes: &[u8]) -> bool {
        let target = self.stage.script_target.as_ref().map(|(target, _)| target.as_str());
        if target != Some(name) {
            debug!("discarding stale script {name}");
            return false;
        }
        self.stage.script_target = None;
        if let Err(err) = self.interpreter.load(name, bytes) {
            warn!("dropping script {name}: {err}");
            return false;
        }
        match resume_at {
            Some(position) => {
                if let Err(err) = self.interpreter.seek(position) {
                    warn!("cannot resume {name}: {err}");
                }
            }
            None => {
                self.run();
            }
        }
        true
    }

    fn run(&mut self) -> InterpreterState {
        let state = self.interpreter.advance(&mut self.stage);
        self.follow_jump();
        state
    }

    fn follow_jump(&mut self) {
        if let Some(name) = self.stage.pending_script.take() {
            if let Err(err) = self.stage.request_script(&name, None) {
                warn!("jump to {name} failed: {err}");
            }
        }
    }

    /// Resumes after a wait. Ignored while a choice is pending or nothing is
    /// waiting for input.
    pub fn advance(&mut self) -> InterpreterState {
        let state = self.interpreter.state();
        if !self.stage.choices.is_empty() {
            debug!("advance ignored: a choice is pending");
            return state;
        }
        match state {
            InterpreterState::AwaitingInput | InterpreterState::Loaded => {
                self.stage.text.clear();
                self.run()
            }
            other => {
                debug!("advance ignored while {other:?}");
                other
            }
        }
    }

    /// Runs one command line as if it came from the script.
    pub fn execute(&mut self, line: &str) -> Flow {
        let flow = self.stage.command(line);
        if flow == Flow::Suspend {
            self.interpreter.suspend();
        }
        self.follow_jump();
        flow
    }

    /// Jumps to the target of the `index`th registered choice.
    pub fn select_choice(&mut self, index: usize) -> EngineResult<()> {
        let choice = self
            .stage
            .choices
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::index("choice", index, self.stage.choices.len()))?;
        info!("selected choice {index}: {} -> {}", choice.prompt, choice.target);
        self.stage.choices.clear();
        self.stage.text.clear();
        self.interpreter.suspend();
        self.stage.request_script(&choice.target, None)
    }

    /// Advances every animation to frame timestamp `now`.
    pub fn tick(&mut self, now: u64) {
        self.stage.now = now;
        self.stage.images.tick(now);
    }

    pub fn render(&mut self) -> Frame {
        let stage = &mut self.stage;
        let frame = Frame {
            time: stage.now,
            draws: stage.images.draw(&stage.textures),
            speaker: stage.text.speaker.clone(),
            message: stage.text.message.clone(),
            choices: stage.choices.clone(),
        };
        stage.renderer.present(&frame);
        frame
    }

    pub fn dump(&self) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot {
            variables: self.stage.variables.clone(),
            ..SessionSnapshot::default()
        };
        snapshot.script = match (&self.stage.script_target, self.interpreter.name()) {
            (Some((target, resume_at)), _) => Some(ScriptSnapshot {
                name: target.clone(),
                position: resume_at.unwrap_or(0),
            }),
            (None, Some(name)) => Some(ScriptSnapshot {
                name: name.to_string(),
                position: self.interpreter.position(),
            }),
            (None, None) => None,
        };
        snapshot.music = self.stage.audio.music().map(|name| MusicSnapshot {
            name: name.to_string(),
        });
        for (channel, name) in self.stage.audio.looping_effects() {
            snapshot.effects.insert(channel, name.to_string());
        }
        for (class, index, slot) in self.stage.images.active() {
            let Some(name) = slot.asset() else { continue };
            let (x, y) = slot.shift();
            snapshot.images.entry(class).or_default().insert(
                index,
                ImageSnapshot {
                    name: name.to_string(),
                    x,
                    y,
                },
            );
        }
        snapshot
    }

    /// Resets every subsystem and replays `snapshot` through the live setters.
    /// Every entry is attempted; the first failure is returned.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) -> EngineResult<()> {
        let stage = &mut self.stage;
        stage.audio.stop_all();
        stage.images.clear_all();
        stage.text.clear();
        stage.choices.clear();
        stage.pending_script = None;
        stage.script_target = None;
        stage.variables = snapshot.variables.clone();

        let mut results = Vec::new();
        if let Some(music) = &snapshot.music {
            results.push(stage.play_music(&music.name));
        }
        for (&channel, name) in &snapshot.effects {
            results.push(stage.play_effect(channel, name, LOOP_FOREVER));
        }
        for (&class, slots) in &snapshot.images {
            for (&index, image) in slots {
                results.push(stage.bind_image(class, index, &image.name, (image.x, image.y)));
            }
        }
        if let Some(script) = &snapshot.script {
            self.interpreter.suspend();
            results.push(
                self.stage
                    .request_script(&script.name, Some(script.position)),
            );
        }
        results.into_iter().collect()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.dump().write_to(path)?;
        info!("saved session to {}", path.display());
        Ok(())
    }

    pub fn load_from(&mut self, path: &Path) -> Result<()> {
        let snapshot = SessionSnapshot::read_from(path)?;
        self.restore(&snapshot)
            .with_context(|| format!("restoring session from {}", path.display()))?;
        info!("restored session from {}", path.display());
        Ok(())
    }
}

fn open_source(config: &EngineConfig) -> Result<Arc<dyn ByteSource>> {
    match config.base_url.as_deref() {
        Some(url) => remote_source(url),
        None => Ok(Arc::new(LocalSource::new(&config.asset_root))),
    }
}

#[cfg(feature = "network")]
fn remote_source(url: &str) -> Result<Arc<dyn ByteSource>> {
    let source =
        crate::fetch::HttpSource::new(url).with_context(|| format!("connecting to {url}"))?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "network"))]
fn remote_source(url: &str) -> Result<Arc<dyn ByteSource>> {
    anyhow::bail!("cannot fetch from {url}: built without the `network` feature")
}
