//! Runtime core for CatScene visual novels: archive access, asynchronous
//! asset fetching, script playback and the presentation state it drives.

pub mod archive;
pub mod audio;
pub mod cache;
pub mod cli;
pub mod codec;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod fetch;
pub mod image;
pub mod interpreter;
pub mod render;
pub mod runtime;
pub mod snapshot;

pub use engine::{AssetTag, Backends, Engine, TextState};
pub use error::{EngineError, EngineResult};
