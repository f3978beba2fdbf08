//! Per-stream convert, stamp, encode and write.

use crate::codec::{Converter, Encoder, Output};
use crate::error::{EncodeError, Result, SetupStage};
use crate::frame::{AudioFormat, FrameFormat, MediaKind, RawFrame, VideoFormat};
use crate::interleave::{self, StreamClock};
use crate::rational::{Rational, rescale};

fn encode_err(err: anyhow::Error) -> EncodeError {
    EncodeError::EncodeFailed(format!("{:#}", err))
}

fn convert_err(err: anyhow::Error) -> EncodeError {
    EncodeError::ConversionFailed(format!("{:#}", err))
}

/// Writes every packet the encoder has ready. Returns how many were written.
fn drain_packets(
    encoder: &mut dyn Encoder,
    output: &mut dyn Output,
    index: usize,
    stream_time_base: Rational,
) -> Result<usize> {
    let encoder_time_base = encoder.time_base();
    let mut written = 0;
    while let Some(mut packet) = encoder.receive_packet().map_err(encode_err)? {
        packet.rescale_ts(encoder_time_base, stream_time_base);
        output
            .write_packet(index, packet)
            .map_err(|e| EncodeError::OutputWrite(format!("{:#}", e)))?;
        written += 1;
    }
    Ok(written)
}

pub struct VideoSink {
    index: usize,
    encoder: Box<dyn Encoder>,
    target: VideoFormat,
    stream_time_base: Rational,
    // rebuilt whenever the source format changes
    converter: Option<(VideoFormat, Box<dyn Converter>)>,
    next_pts: i64,
}

impl VideoSink {
    pub fn new(index: usize, encoder: Box<dyn Encoder>, stream_time_base: Rational) -> Result<Self> {
        let FrameFormat::Video(target) = encoder.input_format() else {
            return Err(EncodeError::StreamSetup {
                stage: SetupStage::OpenCodec,
                message: format!("video encoder expects {}", encoder.input_format()),
            });
        };
        Ok(Self {
            index,
            encoder,
            target,
            stream_time_base,
            converter: None,
            next_pts: 0,
        })
    }

    pub fn clock(&self) -> StreamClock {
        StreamClock::new(self.next_pts, self.encoder.time_base())
    }

    fn convert(&mut self, frame: &RawFrame, source: VideoFormat) -> Result<RawFrame> {
        let converter = match &mut self.converter {
            Some((format, converter)) if *format == source => converter,
            slot => {
                let converter = self
                    .encoder
                    .converter(&FrameFormat::Video(source))
                    .map_err(convert_err)?;
                &mut slot.insert((source, converter)).1
            }
        };
        converter.convert(frame).map_err(convert_err)
    }

    pub fn write_frame(&mut self, frame: &RawFrame, output: &mut dyn Output) -> Result<usize> {
        let source = frame
            .video_format()
            .ok_or(EncodeError::UnsupportedKind(frame.kind()))?;
        let converted;
        let input = if source == self.target {
            frame
        } else {
            converted = self.convert(frame, source)?;
            &converted
        };

        let pts = self.next_pts;
        self.next_pts += 1;
        self.encoder.send_frame(input, pts).map_err(encode_err)?;
        drain_packets(
            self.encoder.as_mut(),
            output,
            self.index,
            self.stream_time_base,
        )
    }

    pub fn finish(&mut self, output: &mut dyn Output) -> Result<usize> {
        self.encoder.send_eof().map_err(encode_err)?;
        drain_packets(
            self.encoder.as_mut(),
            output,
            self.index,
            self.stream_time_base,
        )
    }
}

pub struct AudioSink {
    index: usize,
    encoder: Box<dyn Encoder>,
    target: AudioFormat,
    sample_rate: u32,
    stream_time_base: Rational,
    converter: Option<(AudioFormat, Box<dyn Converter>)>,
    samples_count: i64,
}

impl AudioSink {
    pub fn new(
        index: usize,
        encoder: Box<dyn Encoder>,
        sample_rate: u32,
        stream_time_base: Rational,
    ) -> Result<Self> {
        let FrameFormat::Audio(target) = encoder.input_format() else {
            return Err(EncodeError::StreamSetup {
                stage: SetupStage::OpenCodec,
                message: format!("audio encoder expects {}", encoder.input_format()),
            });
        };
        Ok(Self {
            index,
            encoder,
            target,
            sample_rate,
            stream_time_base,
            converter: None,
            samples_count: 0,
        })
    }

    fn sample_time_base(&self) -> Rational {
        Rational::new(1, self.sample_rate as i32)
    }

    pub fn clock(&self) -> StreamClock {
        let time_base = self.encoder.time_base();
        StreamClock::new(
            rescale(self.samples_count, self.sample_time_base(), time_base),
            time_base,
        )
    }

    fn check_frame_size(&self, expected: i64) -> Result<()> {
        match self.encoder.frame_size() {
            Some(size) if expected != size as i64 => Err(EncodeError::ConversionFailed(format!(
                "encoder takes {} samples per frame, got {}",
                size, expected
            ))),
            _ => Ok(()),
        }
    }

    fn convert(&mut self, frame: &RawFrame, source: AudioFormat) -> Result<RawFrame> {
        let converter = match &mut self.converter {
            Some((format, converter)) if *format == source => converter,
            slot => {
                let converter = self
                    .encoder
                    .converter(&FrameFormat::Audio(source))
                    .map_err(convert_err)?;
                &mut slot.insert((source, converter)).1
            }
        };
        let expected = converter.delay() + frame.samples() as i64;
        let converted = converter.convert(frame).map_err(convert_err)?;
        self.check_frame_size(expected)?;
        Ok(converted)
    }

    pub fn write_frame(&mut self, frame: &RawFrame, output: &mut dyn Output) -> Result<usize> {
        let source = frame
            .audio_format()
            .ok_or(EncodeError::UnsupportedKind(frame.kind()))?;
        let converted;
        let input = if source == self.target {
            self.check_frame_size(frame.samples() as i64)?;
            frame
        } else {
            converted = self.convert(frame, source)?;
            &converted
        };

        let pts = self.clock().pts;
        self.samples_count += input.samples() as i64;
        self.encoder.send_frame(input, pts).map_err(encode_err)?;
        drain_packets(
            self.encoder.as_mut(),
            output,
            self.index,
            self.stream_time_base,
        )
    }

    pub fn finish(&mut self, output: &mut dyn Output) -> Result<usize> {
        self.encoder.send_eof().map_err(encode_err)?;
        drain_packets(
            self.encoder.as_mut(),
            output,
            self.index,
            self.stream_time_base,
        )
    }
}

/// The enabled sinks, at most one per kind.
#[derive(Default)]
pub struct StreamSinks {
    pub video: Option<VideoSink>,
    pub audio: Option<AudioSink>,
}

impl StreamSinks {
    /// Lane the worker should pop next.
    pub fn select(&self) -> Option<MediaKind> {
        interleave::select(
            self.video.as_ref().map(VideoSink::clock),
            self.audio.as_ref().map(AudioSink::clock),
        )
    }

    pub fn has(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => self.video.is_some(),
            MediaKind::Audio => self.audio.is_some(),
        }
    }

    pub fn write_frame(&mut self, frame: &RawFrame, output: &mut dyn Output) -> Result<usize> {
        match frame.kind() {
            MediaKind::Video => match &mut self.video {
                Some(sink) => sink.write_frame(frame, output),
                None => Err(EncodeError::UnsupportedKind(MediaKind::Video)),
            },
            MediaKind::Audio => match &mut self.audio {
                Some(sink) => sink.write_frame(frame, output),
                None => Err(EncodeError::UnsupportedKind(MediaKind::Audio)),
            },
        }
    }

    /// Flushes delayed packets out of every encoder.
    pub fn finish(&mut self, output: &mut dyn Output) -> Result<usize> {
        let mut written = 0;
        if let Some(sink) = &mut self.video {
            written += sink.finish(output)?;
        }
        if let Some(sink) = &mut self.audio {
            written += sink.finish(output)?;
        }
        Ok(written)
    }
}
