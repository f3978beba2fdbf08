use std::sync::Arc;
use std::thread::JoinHandle;

use crate::codec::Output;
use crate::error::{EncodeError, Result, SetupStage};
use crate::logger::Logger;
use crate::queue::{FrameQueues, StopMode};
use crate::sink::StreamSinks;

/// What the worker hands back when its thread ends.
pub(crate) struct WorkerExit {
    pub sinks: StreamSinks,
    pub output: Box<dyn Output>,
    pub error: Option<EncodeError>,
    pub frames: u64,
}

pub(crate) struct EncodeWorker {
    queues: Arc<FrameQueues>,
    sinks: StreamSinks,
    output: Box<dyn Output>,
    logger: Logger,
    frames: u64,
}

impl EncodeWorker {
    pub fn new(
        queues: Arc<FrameQueues>,
        sinks: StreamSinks,
        output: Box<dyn Output>,
        logger: Logger,
    ) -> Self {
        Self {
            queues,
            sinks,
            output,
            logger,
            frames: 0,
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<WorkerExit>> {
        std::thread::Builder::new()
            .name("encode-worker".to_string())
            .spawn(move || self.run())
            .map_err(|e| EncodeError::setup(SetupStage::StartWorker, e.into()))
    }

    fn run(mut self) -> WorkerExit {
        let error = self.process().err();
        match &error {
            // nothing pops after this, so refuse further pushes
            None => self.queues.request_stop(StopMode::Drain),
            Some(err) => {
                self.logger
                    .error(format_args!("encode worker stopped: {}", err));
                self.queues.request_stop(StopMode::Immediate);
                let discarded = self.queues.discard();
                if discarded > 0 {
                    self.logger.warn(format_args!(
                        "discarded {} queued frames after failure",
                        discarded
                    ));
                }
            }
        }
        WorkerExit {
            sinks: self.sinks,
            output: self.output,
            error,
            frames: self.frames,
        }
    }

    fn process(&mut self) -> Result<()> {
        loop {
            if self.queues.stop_mode() == Some(StopMode::Immediate) {
                self.logger.debug(format_args!("encode worker aborted"));
                return Ok(());
            }
            let Some(lane) = self.sinks.select() else {
                return Ok(());
            };
            let Some(frame) = self.queues.pop(lane) else {
                self.logger
                    .debug(format_args!("{} queue reached end of stream", lane));
                return Ok(());
            };

            let result = self.sinks.write_frame(&frame, self.output.as_mut());
            frame.release();
            let packets = result?;
            self.frames += 1;

            let stats = self.queues.stats();
            self.logger.trace(format_args!(
                "{} frame {} encoded into {} packets, queued {} frames {} KB",
                lane, self.frames, packets, stats.count, stats.bytes_kb
            ));
        }
    }
}
