//! In-memory backend for exercising pipelines without a real codec library.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, bail};
use bytes::Bytes;

use crate::codec::{Backend, Converter, Encoder, Output, Packet};
use crate::config::{EncoderOptions, StreamConfig};
use crate::error::SetupStage;
use crate::frame::{AudioFormat, FrameFormat, MediaKind, RawFrame, SampleFormat, VideoFormat};
use crate::rational::Rational;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Header,
    Packet {
        index: usize,
        kind: MediaKind,
        pts: Option<i64>,
        duration: i64,
    },
    Trailer,
}

/// Everything the mock output and its encoders observed.
#[derive(Debug, Default)]
pub struct Recording {
    pub path: Option<PathBuf>,
    pub events: Vec<Event>,
    pub converters: Vec<FrameFormat>,
    pub frames_sent: Vec<(MediaKind, i64)>,
    pub outputs_dropped: usize,
}

impl Recording {
    pub fn packets(&self) -> Vec<(MediaKind, i64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Packet { kind, pts, .. } => Some((*kind, pts.unwrap_or(-1))),
                _ => None,
            })
            .collect()
    }

    pub fn kinds(&self) -> Vec<MediaKind> {
        self.packets().into_iter().map(|(kind, _)| kind).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSettings {
    /// Frames an encoder holds back until EOF.
    pub encoder_delay: usize,
    pub audio_frame_size: Option<usize>,
    /// Defaults to 1/frame_rate.
    pub video_time_base: Option<Rational>,
    /// Defaults to the encoder's timebase.
    pub stream_time_base: Option<Rational>,
    pub fail_stage: Option<SetupStage>,
    /// Fail `send_frame` on this zero-based frame of any stream.
    pub fail_on_frame: Option<usize>,
    pub fail_trailer: bool,
    /// Sleep in `send_frame`, to keep frames queued.
    pub encode_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub settings: MockSettings,
    pub recording: Arc<Mutex<Recording>>,
}

impl MockBackend {
    pub fn new(settings: MockSettings) -> Self {
        Self {
            settings,
            recording: Arc::default(),
        }
    }

    pub fn recording(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.recording.lock().unwrap()
    }
}

impl Backend for MockBackend {
    fn create_output(&self, path: &Path) -> anyhow::Result<Box<dyn Output>> {
        if self.settings.fail_stage == Some(SetupStage::OpenOutput) {
            bail!("cannot create {}", path.display());
        }
        self.recording.lock().unwrap().path = Some(path.to_path_buf());
        Ok(Box::new(MockOutput {
            settings: self.settings.clone(),
            recording: self.recording.clone(),
            streams: Vec::new(),
        }))
    }
}

struct MockOutput {
    settings: MockSettings,
    recording: Arc<Mutex<Recording>>,
    // (config, encoder timebase)
    streams: Vec<(StreamConfig, Rational)>,
}

impl Output for MockOutput {
    fn add_stream(&mut self, config: &StreamConfig) -> anyhow::Result<usize> {
        if self.settings.fail_stage == Some(SetupStage::AddStream) {
            bail!("no room for a {} stream", config.kind());
        }
        let time_base = match config {
            StreamConfig::Video(v) => self
                .settings
                .video_time_base
                .unwrap_or(Rational::new(1, v.frame_rate as i32)),
            StreamConfig::Audio(a) => Rational::new(1, a.sample_rate as i32),
        };
        self.streams.push((config.clone(), time_base));
        Ok(self.streams.len() - 1)
    }

    fn open_encoder(
        &mut self,
        index: usize,
        _options: &EncoderOptions,
    ) -> anyhow::Result<Box<dyn Encoder>> {
        if self.settings.fail_stage == Some(SetupStage::OpenCodec) {
            bail!("encoder not found");
        }
        let (config, time_base) = self.streams.get(index).context("unknown stream")?;
        let (input_format, frame_size) = match config {
            StreamConfig::Video(v) => (
                FrameFormat::Video(VideoFormat {
                    pixel_format: v.pixel_format,
                    width: v.width,
                    height: v.height,
                }),
                None,
            ),
            StreamConfig::Audio(a) => (
                FrameFormat::Audio(AudioFormat {
                    sample_format: a.sample_format.unwrap_or(SampleFormat::S16),
                    channels: a.channels,
                }),
                self.settings.audio_frame_size,
            ),
        };
        Ok(Box::new(MockEncoder {
            settings: self.settings.clone(),
            recording: self.recording.clone(),
            time_base: *time_base,
            input_format,
            frame_size,
            pending: Vec::new(),
            eof: false,
            sent: 0,
        }))
    }

    fn write_header(&mut self) -> anyhow::Result<()> {
        if self.settings.fail_stage == Some(SetupStage::WriteHeader) {
            bail!("header rejected");
        }
        self.recording.lock().unwrap().events.push(Event::Header);
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Rational {
        self.settings
            .stream_time_base
            .unwrap_or_else(|| self.streams[index].1)
    }

    fn write_packet(&mut self, index: usize, packet: Packet) -> anyhow::Result<()> {
        let kind = self.streams[index].0.kind();
        self.recording.lock().unwrap().events.push(Event::Packet {
            index,
            kind,
            pts: packet.pts,
            duration: packet.duration,
        });
        Ok(())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        if self.settings.fail_trailer {
            bail!("disk full");
        }
        self.recording.lock().unwrap().events.push(Event::Trailer);
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        if let Ok(mut recording) = self.recording.lock() {
            recording.outputs_dropped += 1;
        }
    }
}

struct MockEncoder {
    settings: MockSettings,
    recording: Arc<Mutex<Recording>>,
    time_base: Rational,
    input_format: FrameFormat,
    frame_size: Option<usize>,
    pending: Vec<Packet>,
    eof: bool,
    sent: usize,
}

impl Encoder for MockEncoder {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn input_format(&self) -> FrameFormat {
        self.input_format
    }

    fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    fn converter(&mut self, source: &FrameFormat) -> anyhow::Result<Box<dyn Converter>> {
        self.recording.lock().unwrap().converters.push(*source);
        Ok(Box::new(MockConverter {
            target: self.input_format,
        }))
    }

    fn send_frame(&mut self, frame: &RawFrame, pts: i64) -> anyhow::Result<()> {
        if frame.format() != self.input_format {
            bail!("expected {}, got {}", self.input_format, frame.format());
        }
        if self.settings.fail_on_frame == Some(self.sent) {
            bail!("encoder rejected frame {}", self.sent);
        }
        if let Some(delay) = self.settings.encode_delay {
            std::thread::sleep(delay);
        }
        self.sent += 1;
        self.recording
            .lock()
            .unwrap()
            .frames_sent
            .push((frame.kind(), pts));
        let duration = match frame.kind() {
            MediaKind::Video => 1,
            MediaKind::Audio => frame.samples() as i64,
        };
        let mut packet = Packet::new(Bytes::from(vec![0u8; 4]), pts);
        packet.duration = duration;
        self.pending.push(packet);
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        if self.pending.is_empty() || (!self.eof && self.pending.len() <= self.settings.encoder_delay)
        {
            return Ok(None);
        }
        Ok(Some(self.pending.remove(0)))
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.eof = true;
        Ok(())
    }
}

struct MockConverter {
    target: FrameFormat,
}

impl Converter for MockConverter {
    fn convert(&mut self, frame: &RawFrame) -> anyhow::Result<RawFrame> {
        let converted = match self.target {
            FrameFormat::Video(v) => RawFrame::make_video(v.pixel_format, v.width, v.height),
            FrameFormat::Audio(a) => {
                RawFrame::make_audio(a.sample_format, a.channels, frame.samples())
            }
        };
        Ok(converted?)
    }
}
