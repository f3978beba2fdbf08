//! Pipeline lifecycle: open the output, feed the worker, close.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::codec::Backend;
use crate::config::{PipelineConfig, StreamConfig};
use crate::error::{EncodeError, Result, SetupStage};
use crate::frame::{MediaKind, RawFrame};
use crate::logger::{LogHandler, Logger};
use crate::queue::{FrameQueues, StopMode};
use crate::sink::{AudioSink, StreamSinks, VideoSink};
use crate::worker::{EncodeWorker, WorkerExit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Open,
    Flushing,
    Closed,
}

/// Producer handle; clone one per producing thread.
#[derive(Debug, Clone)]
pub struct FrameSender {
    queues: Arc<FrameQueues>,
    video: bool,
    audio: bool,
}

impl FrameSender {
    /// Queues a frame for the worker. Never blocks on the worker.
    pub fn push(&self, frame: RawFrame) -> Result<()> {
        let enabled = match frame.kind() {
            MediaKind::Video => self.video,
            MediaKind::Audio => self.audio,
        };
        if !enabled {
            return Err(EncodeError::UnsupportedKind(frame.kind()));
        }
        self.queues.push(frame)
    }
}

pub struct PipelineBuilder {
    config: PipelineConfig,
    logger: Logger,
}

impl PipelineBuilder {
    pub fn log_handler(mut self, handler: Arc<dyn LogHandler>) -> Self {
        self.logger = Logger::new(handler);
        self
    }

    pub fn open(self, backend: &dyn Backend) -> Result<Pipeline> {
        let PipelineBuilder { config, logger } = self;
        config.validate()?;

        let mut output = backend
            .create_output(&config.output)
            .map_err(|e| EncodeError::setup(SetupStage::OpenOutput, e))?;

        let mut streams = Vec::new();
        for stream in [
            config.video.clone().map(StreamConfig::Video),
            config.audio.clone().map(StreamConfig::Audio),
        ]
        .into_iter()
        .flatten()
        {
            let index = output
                .add_stream(&stream)
                .map_err(|e| EncodeError::setup(SetupStage::AddStream, e))?;
            logger.debug(format_args!(
                "added {} stream {} ({})",
                stream.kind(),
                index,
                stream.codec()
            ));
            streams.push((index, stream));
        }

        let mut encoders = Vec::with_capacity(streams.len());
        for (index, stream) in streams {
            let encoder = output
                .open_encoder(index, &config.options)
                .map_err(|e| EncodeError::setup(SetupStage::OpenCodec, e))?;
            encoders.push((index, stream, encoder));
        }

        output
            .write_header()
            .map_err(|e| EncodeError::setup(SetupStage::WriteHeader, e))?;

        let mut sinks = StreamSinks::default();
        for (index, stream, encoder) in encoders {
            let stream_time_base = output.stream_time_base(index);
            match stream {
                StreamConfig::Video(_) => {
                    sinks.video = Some(VideoSink::new(index, encoder, stream_time_base)?);
                }
                StreamConfig::Audio(audio) => {
                    sinks.audio = Some(AudioSink::new(
                        index,
                        encoder,
                        audio.sample_rate,
                        stream_time_base,
                    )?);
                }
            }
        }

        let queues = Arc::new(FrameQueues::new());
        let sender = FrameSender {
            queues: queues.clone(),
            video: sinks.has(MediaKind::Video),
            audio: sinks.has(MediaKind::Audio),
        };
        let worker = EncodeWorker::new(queues.clone(), sinks, output, logger.clone()).spawn()?;
        logger.info(format_args!(
            "pipeline open: {} (video: {}, audio: {})",
            config.output.display(),
            sender.video,
            sender.audio
        ));

        Ok(Pipeline {
            queues,
            sender,
            worker: Some(worker),
            state: PipelineState::Open,
            output_path: config.output,
            logger,
        })
    }
}

/// A running encode into one output container.
///
/// Producers push raw frames (directly or through [`FrameSender`] clones); a
/// single `encode-worker` thread interleaves them by timestamp, encodes them
/// and writes the packets. [`Pipeline::close`] must run before the output is
/// complete and is called from `Drop` if the owner does not.
pub struct Pipeline {
    queues: Arc<FrameQueues>,
    sender: FrameSender,
    worker: Option<JoinHandle<WorkerExit>>,
    state: PipelineState,
    output_path: PathBuf,
    logger: Logger,
}

impl Pipeline {
    pub fn builder(config: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            logger: Logger::default(),
        }
    }

    pub fn open(config: PipelineConfig, backend: &dyn Backend) -> Result<Self> {
        Self::builder(config).open(backend)
    }

    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    pub fn push(&self, frame: RawFrame) -> Result<()> {
        self.sender.push(frame)
    }

    /// Signals that no more frames are coming; the worker ends once the
    /// selected queue runs dry.
    pub fn flush(&mut self) {
        if !self.queues.is_flushed() {
            self.logger.debug(format_args!(
                "flush requested with {} frames queued",
                self.queues.queued_count()
            ));
        }
        self.queues.flush();
        if self.state == PipelineState::Open {
            self.state = PipelineState::Flushing;
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn queued_count(&self) -> usize {
        self.queues.queued_count()
    }

    pub fn queued_bytes_kb(&self) -> usize {
        self.queues.queued_bytes_kb()
    }

    /// The worker is alive and has not been told to stop immediately.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
            && self.queues.stop_mode() != Some(StopMode::Immediate)
    }

    /// Finishes the queued frames, flushes the encoders and writes the trailer.
    ///
    /// Returns the worker's error if it failed. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }
        self.queues.request_stop(StopMode::Drain);
        self.finalize()
    }

    /// Stops the worker without encoding what is still queued, then finalizes
    /// the output like [`Pipeline::close`].
    pub fn abort(&mut self) -> Result<()> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }
        self.queues.request_stop(StopMode::Immediate);
        self.finalize()
    }

    pub async fn close_async(mut self) -> Result<()> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|_| EncodeError::WorkerPanicked)?
    }

    fn finalize(&mut self) -> Result<()> {
        self.state = PipelineState::Closed;
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let joined = worker.join();

        let discarded = self.queues.discard();
        if discarded > 0 {
            self.logger
                .warn(format_args!("discarded {} unprocessed frames", discarded));
        }

        let WorkerExit {
            mut sinks,
            mut output,
            error,
            frames,
        } = joined.map_err(|_| EncodeError::WorkerPanicked)?;

        let mut result = match error {
            Some(err) => Err(err),
            None => sinks.finish(output.as_mut()).map(|delayed| {
                self.logger
                    .debug(format_args!("flushed {} delayed packets", delayed));
            }),
        };
        if let Err(e) = output.write_trailer() {
            let err = EncodeError::OutputWrite(format!("{:#}", e));
            self.logger.error(format_args!("{}", err));
            if result.is_ok() {
                result = Err(err);
            }
        }
        drop(sinks);
        drop(output);

        self.logger.info(format_args!(
            "pipeline closed: {} ({} frames)",
            self.output_path.display(),
            frames
        ));
        result
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            self.logger
                .error(format_args!("closing pipeline on drop: {}", e));
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("output", &self.output_path)
            .field("state", &self.state)
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
