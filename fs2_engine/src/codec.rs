use std::sync::Arc;

use fs2_formats::{peek_stdinfo, StdInfo};

use crate::error::{EngineError, EngineResult};

/// A decoded image: placement metadata plus whatever pixel buffer the codec
/// produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub info: StdInfo,
    pub pixels: Arc<Vec<u8>>,
}

impl DecodedImage {
    /// Top-left corner of the image for a given slot shift.
    pub fn position(&self, shift: (i32, i32)) -> (i32, i32) {
        let (x, y) = self.info.origin();
        (x + shift.0, y + shift.1)
    }
}

/// Pixel decoder for HG-3 containers. Implementations must be pure.
pub trait ImageCodec {
    fn decode(&self, bytes: &[u8]) -> EngineResult<DecodedImage>;
}

/// Reads only the `stdinfo` placement block and leaves pixels empty. Enough
/// for headless playback, where nothing is rasterized.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataCodec;

impl ImageCodec for MetadataCodec {
    fn decode(&self, bytes: &[u8]) -> EngineResult<DecodedImage> {
        let info = peek_stdinfo(bytes).map_err(|err| EngineError::Codec(err.to_string()))?;
        Ok(DecodedImage {
            info,
            pixels: Arc::new(Vec::new()),
        })
    }
}
