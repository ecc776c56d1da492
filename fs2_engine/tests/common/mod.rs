#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use fs2_engine::archive::ArchiveResolver;
use fs2_engine::audio::RecordingAudioBackend;
use fs2_engine::codec::MetadataCodec;
use fs2_engine::config::{EngineConfig, MANIFEST_NAME};
use fs2_engine::fetch::{Dispatch, MemorySource};
use fs2_engine::render::RecordingRenderer;
use fs2_engine::{Backends, Engine};
use fs2_formats::hg3::build_image;
use fs2_formats::{build_scene, encrypt_entry, ArchiveEntry, AssetLocation, KifManifest, RecordKind, StdInfo};

pub const ARCHIVE: &str = "data.int";
pub const KEY: [u8; 4] = *b"FS2k";

/// An encrypted archive, its manifest and any loose files, built in memory.
pub struct Pack {
    manifest: KifManifest,
    archive: Vec<u8>,
    loose: Vec<(String, Vec<u8>)>,
}

impl Pack {
    pub fn new() -> Self {
        Pack {
            manifest: KifManifest::new(vec![ArchiveEntry {
                filename: ARCHIVE.into(),
                entry_count: 0,
                encrypted: true,
                key: KEY,
            }]),
            archive: Vec::new(),
            loose: Vec::new(),
        }
    }

    pub fn asset(mut self, name: &str, plain: Vec<u8>) -> Self {
        let mut cipher = plain;
        encrypt_entry(&KEY, &mut cipher).unwrap();
        let offset = self.archive.len() as u64;
        let length = cipher.len() as u64;
        self.archive.extend_from_slice(&cipher);
        self.manifest.insert(
            name,
            AssetLocation {
                archive: 0,
                offset,
                length,
            },
        );
        self
    }

    /// `origin` is where the image lands with a zero shift.
    pub fn image(self, name: &str, origin: (i32, i32)) -> Self {
        let info = StdInfo {
            width: 64,
            height: 48,
            bit_depth: 32,
            offset_x: origin.0,
            offset_y: origin.1,
            ..StdInfo::default()
        };
        self.asset(&format!("{name}.hg3"), build_image(&info, b"rle", b"cmd"))
    }

    pub fn sound(self, name: &str) -> Self {
        self.asset(&format!("{name}.ogg"), ogg(name))
    }

    pub fn script(self, name: &str, records: &[(RecordKind, &str)]) -> Self {
        self.asset(&format!("{name}.cst"), build_scene(records, true))
    }

    /// A scene that only exists as `scene/NAME.cst` next to the archives.
    pub fn loose_script(mut self, name: &str, records: &[(RecordKind, &str)]) -> Self {
        self.loose
            .push((format!("scene/{name}.cst"), build_scene(records, false)));
        self
    }

    pub fn source(&self) -> MemorySource {
        let mut source = MemorySource::new()
            .with(MANIFEST_NAME, self.manifest.to_bytes())
            .with(ARCHIVE, self.archive.clone());
        for (path, bytes) in &self.loose {
            source.insert(path.clone(), bytes.clone());
        }
        source
    }

    pub fn write_to(&self, root: &Path) -> Result<()> {
        fs::write(root.join(MANIFEST_NAME), self.manifest.to_bytes())?;
        fs::write(root.join(ARCHIVE), &self.archive)?;
        for (path, bytes) in &self.loose {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, bytes)?;
        }
        Ok(())
    }

    pub fn session(&self, dispatch: Dispatch) -> Session {
        self.session_with(dispatch, &EngineConfig::default())
    }

    pub fn session_with(&self, dispatch: Dispatch, config: &EngineConfig) -> Session {
        let source = self.source();
        let resolver = ArchiveResolver::load(&source, MANIFEST_NAME).unwrap();
        let audio = RecordingAudioBackend::new();
        let renderer = RecordingRenderer::new();
        let backends = Backends {
            codec: Box::new(MetadataCodec),
            audio: Box::new(audio.clone()),
            renderer: Box::new(renderer.clone()),
        };
        let engine = Engine::new(Arc::new(source), resolver, dispatch, config, backends);
        Session {
            engine,
            audio,
            renderer,
        }
    }
}

pub struct Session {
    pub engine: Engine,
    pub audio: RecordingAudioBackend,
    pub renderer: RecordingRenderer,
}

pub fn ogg(name: &str) -> Vec<u8> {
    format!("OggS:{name}").into_bytes()
}

pub fn command(text: &str) -> (RecordKind, &str) {
    (RecordKind::Command, text)
}

pub fn message(text: &str) -> (RecordKind, &str) {
    (RecordKind::Message, text)
}

pub fn speaker(text: &str) -> (RecordKind, &str) {
    (RecordKind::Speaker, text)
}

pub const WAIT: (RecordKind, &str) = (RecordKind::Wait, "");
pub const PAGE: (RecordKind, &str) = (RecordKind::PageBreak, "");
