use ffmpeg_next::software::resampling;
use lite_encoder::codec::Converter;
use lite_encoder::{AudioFormat, RawFrame};

use crate::convert;

/// Sample format and channel conversion through libswresample. Input and
/// output share one sample rate.
pub struct Resampler {
    context: resampling::Context,
    source: AudioFormat,
    target: AudioFormat,
    rate: u32,
}

impl Resampler {
    pub fn new(source: AudioFormat, target: AudioFormat, rate: u32) -> anyhow::Result<Self> {
        let context = resampling::Context::get(
            convert::sample_to_av(source.sample_format),
            convert::channel_layout(source.channels),
            rate,
            convert::sample_to_av(target.sample_format),
            convert::channel_layout(target.channels),
            rate,
        )?;
        log::debug!(
            "resampler {} {}ch -> {} {}ch at {} Hz",
            source.sample_format.name(),
            source.channels,
            target.sample_format.name(),
            target.channels,
            rate
        );
        Ok(Self {
            context,
            source,
            target,
            rate,
        })
    }
}

impl Converter for Resampler {
    fn convert(&mut self, frame: &RawFrame) -> anyhow::Result<RawFrame> {
        if frame.audio_format() != Some(self.source) {
            anyhow::bail!("resampler built for {:?}, got {}", self.source, frame.format());
        }
        let input = convert::to_av_audio(frame, self.rate)?;
        let mut converted = ffmpeg_next::frame::Audio::empty();
        self.context.run(&input, &mut converted)?;
        convert::from_av_audio(&converted, self.target.channels)
    }

    fn delay(&self) -> i64 {
        self.context.delay().map_or(0, |d| d.output)
    }
}

// same ownership rule as the scaler
unsafe impl Send for Resampler {}
