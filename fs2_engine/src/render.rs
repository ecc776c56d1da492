use std::{cell::RefCell, rc::Rc};

use serde::Serialize;

use crate::image::ImageClass;

/// One textured quad, already positioned in screen space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrawCommand {
    pub class: ImageClass,
    pub slot: usize,
    pub part: usize,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub alpha: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceView {
    pub target: String,
    pub prompt: String,
}

/// Everything the host needs to present one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub time: u64,
    pub draws: Vec<DrawCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceView>,
}

pub trait RenderBackend {
    fn present(&mut self, frame: &Frame);
}

/// Keeps every presented frame; cloned handles share the log.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    frames: Rc<RefCell<Vec<Frame>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.borrow().clone()
    }

    pub fn last(&self) -> Option<Frame> {
        self.frames.borrow().last().cloned()
    }
}

impl RenderBackend for RecordingRenderer {
    fn present(&mut self, frame: &Frame) {
        self.frames.borrow_mut().push(frame.clone());
    }
}

/// Holds only the most recent frame, for long headless runs.
#[derive(Clone, Default)]
pub struct LatestFrameRenderer {
    frame: Rc<RefCell<Option<Frame>>>,
}

impl LatestFrameRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Frame> {
        self.frame.borrow().clone()
    }
}

impl RenderBackend for LatestFrameRenderer {
    fn present(&mut self, frame: &Frame) {
        self.frame.borrow_mut().replace(frame.clone());
    }
}
