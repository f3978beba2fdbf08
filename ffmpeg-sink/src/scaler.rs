use ffmpeg_next::software::scaling;
use lite_encoder::codec::Converter;
use lite_encoder::{RawFrame, VideoFormat};

use crate::convert;

/// Pixel format and size conversion through libswscale.
pub struct Scaler {
    context: scaling::Context,
    source: VideoFormat,
    target: VideoFormat,
}

impl Scaler {
    pub fn new(source: VideoFormat, target: VideoFormat) -> anyhow::Result<Self> {
        let context = scaling::Context::get(
            convert::pixel_to_av(source.pixel_format),
            source.width,
            source.height,
            convert::pixel_to_av(target.pixel_format),
            target.width,
            target.height,
            scaling::flag::Flags::BILINEAR,
        )?;
        log::debug!(
            "scaler {} {}x{} -> {} {}x{}",
            source.pixel_format.name(),
            source.width,
            source.height,
            target.pixel_format.name(),
            target.width,
            target.height
        );
        Ok(Self {
            context,
            source,
            target,
        })
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> anyhow::Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

impl Converter for Scaler {
    fn convert(&mut self, frame: &RawFrame) -> anyhow::Result<RawFrame> {
        if frame.video_format() != Some(self.source) {
            anyhow::bail!("scaler built for {:?}, got {}", self.source, frame.format());
        }
        let input = convert::to_av_video(frame)?;
        let mut converted = ffmpeg_next::frame::Video::new(
            convert::pixel_to_av(self.target.pixel_format),
            self.target.width,
            self.target.height,
        );
        self.run(&input, &mut converted)?;
        convert::from_av_video(&converted)
    }
}

// the swscale context is only touched by the thread currently owning the scaler
unsafe impl Send for Scaler {}
