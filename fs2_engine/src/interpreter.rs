use fs2_formats::{CatScene, RecordKind};
use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpreterState {
    Unloaded,
    Loaded,
    Advancing,
    AwaitingInput,
    /// A command asked playback to stop until something external happens,
    /// usually a script jump whose fetch is still in flight.
    Suspended,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Suspend,
}

/// Receives the non-blocking records as the interpreter walks them.
pub trait ScriptSink {
    fn message(&mut self, text: &str);
    fn speaker(&mut self, name: &str);
    fn command(&mut self, text: &str) -> Flow;
}

/// Cursor over one loaded scene.
#[derive(Debug)]
pub struct Interpreter {
    name: Option<String>,
    scene: Option<CatScene>,
    position: usize,
    state: InterpreterState,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter {
            name: None,
            scene: None,
            position: 0,
            state: InterpreterState::Unloaded,
        }
    }

    /// Replaces the current scene. A scene that fails to parse leaves the
    /// previous one and its cursor untouched.
    pub fn load(&mut self, name: &str, bytes: &[u8]) -> EngineResult<()> {
        let scene = CatScene::parse(bytes)?;
        info!("loaded script {name} ({} records)", scene.len());
        self.name = Some(name.to_string());
        self.scene = Some(scene);
        self.position = 0;
        self.state = InterpreterState::Loaded;
        Ok(())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> InterpreterState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn total(&self) -> usize {
        self.scene.as_ref().map_or(0, CatScene::len)
    }

    /// Moves the cursor without dispatching anything in between.
    pub fn seek(&mut self, position: usize) -> EngineResult<()> {
        let total = self.total();
        if self.scene.is_none() || position > total {
            return Err(EngineError::index("script position", position, total));
        }
        self.position = position;
        self.state = InterpreterState::Loaded;
        Ok(())
    }

    /// Parks playback until the next load, e.g. while a jump target is fetched.
    pub fn suspend(&mut self) {
        if self.scene.is_some() {
            self.state = InterpreterState::Suspended;
        }
    }

    /// Drains records into `sink` until one needs input, a command suspends,
    /// or the scene runs out.
    pub fn advance(&mut self, sink: &mut dyn ScriptSink) -> InterpreterState {
        let Some(scene) = self.scene.as_ref() else {
            warn!("advance requested with no script loaded");
            return self.state;
        };

        self.state = InterpreterState::Advancing;
        loop {
            if self.position >= scene.len() {
                info!("end of script {}", self.name.as_deref().unwrap_or("?"));
                self.state = InterpreterState::Ended;
                break;
            }
            let index = self.position;
            self.position += 1;
            let Some(record) = scene.record(index) else {
                warn!("record {index} is unreadable; skipping");
                continue;
            };

            match record.kind {
                RecordKind::Wait | RecordKind::PageBreak => {
                    self.state = InterpreterState::AwaitingInput;
                    break;
                }
                RecordKind::Message => sink.message(&record.text()),
                RecordKind::Speaker => sink.speaker(&record.text()),
                RecordKind::Command => {
                    if sink.command(&record.text()) == Flow::Suspend {
                        self.state = InterpreterState::Suspended;
                        break;
                    }
                }
                RecordKind::SourceFile | RecordKind::LineMarker => {}
                RecordKind::Unknown(kind) => {
                    debug!("skipping record {index} of unknown kind {kind:#04x}");
                }
            }
        }
        self.state
    }
}
