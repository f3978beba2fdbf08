//! Real-time audio/video encode pipeline.
//!
//! Producers push raw frames into a [`Pipeline`]; one background worker
//! interleaves them by timestamp, hands them to a [`codec::Backend`] for
//! conversion and encoding, and writes the packets to a single output.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod interleave;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod rational;
pub mod sink;
mod worker;

#[cfg(test)]
mod testing;

pub use config::{AudioConfig, EncoderOptions, PipelineConfig, StreamConfig, VideoConfig};
pub use error::{EncodeError, Result, SetupStage};
pub use frame::{
    AudioFormat, FRAME_ALIGN, FrameFormat, MediaKind, PixelFormat, RawFrame, SampleFormat,
    VideoFormat,
};
pub use logger::{Level, LogHandler, Logger};
pub use pipeline::{FrameSender, Pipeline, PipelineBuilder, PipelineState};
pub use rational::Rational;
