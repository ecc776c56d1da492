use fs2_formats::{decrypt_entry, AssetLocation, KifManifest};
use log::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::fetch::{ByteSource, FetchPipeline};

/// Everything needed to read one asset out of its archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub name: String,
    pub archive: String,
    pub location: AssetLocation,
    pub key: Option<[u8; 4]>,
}

/// Case-insensitive view over the `kif.fs2` asset catalog.
#[derive(Debug, Clone, Default)]
pub struct ArchiveResolver {
    manifest: KifManifest,
}

impl ArchiveResolver {
    pub fn new(manifest: KifManifest) -> Self {
        ArchiveResolver { manifest }
    }

    pub fn from_manifest(bytes: &[u8]) -> EngineResult<Self> {
        Ok(Self::new(KifManifest::parse(bytes)?))
    }

    pub fn load(source: &dyn ByteSource, manifest_path: &str) -> EngineResult<Self> {
        let bytes = source.read(manifest_path, None)?;
        let resolver = Self::from_manifest(&bytes)?;
        info!(
            "indexed {} assets across {} archives from {manifest_path}",
            resolver.manifest.len(),
            resolver.manifest.archives().len()
        );
        Ok(resolver)
    }

    pub fn manifest(&self) -> &KifManifest {
        &self.manifest
    }

    pub fn contains(&self, name: &str) -> bool {
        self.manifest.find_entry(name).is_some()
    }

    pub fn resolve(&self, name: &str) -> EngineResult<ResolvedAsset> {
        let location = *self
            .manifest
            .find_entry(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        let archive = self.manifest.archive(location.archive).ok_or_else(|| {
            EngineError::Format(fs2_formats::FormatError::TableLayout(format!(
                "asset '{name}' points at missing archive {}",
                location.archive
            )))
        })?;
        Ok(ResolvedAsset {
            name: name.to_string(),
            archive: archive.filename.clone(),
            location,
            key: archive.encrypted.then_some(archive.key),
        })
    }

    /// Issues a byte-range read for `name` against its archive. The bytes are
    /// decrypted on the reading thread, so the completion carries plaintext.
    pub fn fetch_and_decrypt<C: Send + 'static>(
        &self,
        name: &str,
        context: C,
        pipeline: &mut FetchPipeline<C>,
    ) -> EngineResult<()> {
        let asset = self.resolve(name)?;
        let range = Some(asset.location.offset..asset.location.end());
        debug!(
            "{name} -> {} @ 0x{:08X} ({} bytes{})",
            asset.archive,
            asset.location.offset,
            asset.location.length,
            if asset.key.is_some() { ", encrypted" } else { "" }
        );
        match asset.key {
            Some(key) => pipeline.fetch_with(asset.archive, range, context, move |mut bytes| {
                decrypt_entry(&key, &mut bytes)?;
                Ok(bytes)
            }),
            None => pipeline.fetch(asset.archive, range, context),
        }
        Ok(())
    }
}
