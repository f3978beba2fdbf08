//! Boundary to the service that converts, encodes and muxes.
//!
//! The pipeline drives these traits from its worker thread; the production
//! implementation lives in the `ffmpeg-sink` crate. Errors are plain
//! `anyhow::Error`s and every one of them is treated as fatal.

use std::path::Path;

use bytes::Bytes;

use crate::config::{EncoderOptions, StreamConfig};
use crate::frame::{FrameFormat, RawFrame};
use crate::rational::{Rational, rescale};

/// One compressed unit, timestamped in whatever timebase produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Bytes,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub key: bool,
}

impl Packet {
    pub fn new(data: impl Into<Bytes>, pts: i64) -> Self {
        Self {
            data: data.into(),
            pts: Some(pts),
            dts: Some(pts),
            duration: 0,
            key: false,
        }
    }

    pub fn rescale_ts(&mut self, from: Rational, to: Rational) {
        self.pts = self.pts.map(|ts| rescale(ts, from, to));
        self.dts = self.dts.map(|ts| rescale(ts, from, to));
        self.duration = rescale(self.duration, from, to);
    }
}

pub trait Backend: Send + Sync {
    fn create_output(&self, path: &Path) -> anyhow::Result<Box<dyn Output>>;
}

/// A container being written.
pub trait Output: Send {
    /// Adds a stream and returns its index.
    fn add_stream(&mut self, config: &StreamConfig) -> anyhow::Result<usize>;

    fn open_encoder(
        &mut self,
        index: usize,
        options: &EncoderOptions,
    ) -> anyhow::Result<Box<dyn Encoder>>;

    fn write_header(&mut self) -> anyhow::Result<()>;

    /// Valid once the header is written; muxers may adjust it there.
    fn stream_time_base(&self, index: usize) -> Rational;

    fn write_packet(&mut self, index: usize, packet: Packet) -> anyhow::Result<()>;

    fn write_trailer(&mut self) -> anyhow::Result<()>;
}

pub trait Encoder: Send {
    fn time_base(&self) -> Rational;

    /// The only frame format `send_frame` accepts.
    fn input_format(&self) -> FrameFormat;

    /// Samples per audio frame, `None` when the codec takes any count.
    fn frame_size(&self) -> Option<usize>;

    /// Builds a converter from `source` to [`Encoder::input_format`].
    fn converter(&mut self, source: &FrameFormat) -> anyhow::Result<Box<dyn Converter>>;

    fn send_frame(&mut self, frame: &RawFrame, pts: i64) -> anyhow::Result<()>;

    /// Next finished packet, or `None` when the encoder wants more input.
    fn receive_packet(&mut self) -> anyhow::Result<Option<Packet>>;

    fn send_eof(&mut self) -> anyhow::Result<()>;
}

pub trait Converter: Send {
    fn convert(&mut self, frame: &RawFrame) -> anyhow::Result<RawFrame>;

    /// Samples buffered inside the converter.
    fn delay(&self) -> i64 {
        0
    }
}
