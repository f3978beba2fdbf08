//! FFmpeg implementation of the `lite_encoder` codec boundary.

use std::path::Path;

use lite_encoder::codec::{Backend, Output};

pub mod convert;
pub mod encoder;
pub mod hw;
pub mod output;
pub mod resampler;
pub mod scaler;

pub use output::AvOutput;

/// Registers FFmpeg components. Call once at startup before opening a pipeline.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

/// Encodes with libavcodec and muxes with libavformat; the container is
/// picked from the output path's extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl Backend for FfmpegBackend {
    fn create_output(&self, path: &Path) -> anyhow::Result<Box<dyn Output>> {
        Ok(Box::new(AvOutput::new(path)?))
    }
}
