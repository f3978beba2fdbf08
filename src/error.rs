use std::fmt::{Display, Formatter};

use crate::frame::MediaKind;

pub type Result<T> = std::result::Result<T, EncodeError>;

/// Step of `Pipeline::open` that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    OpenOutput,
    AddStream,
    OpenCodec,
    WriteHeader,
    StartWorker,
}

impl Display for SetupStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SetupStage::OpenOutput => "open output",
            SetupStage::AddStream => "add stream",
            SetupStage::OpenCodec => "open codec",
            SetupStage::WriteHeader => "write header",
            SetupStage::StartWorker => "start worker",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("out of memory allocating {0} bytes")]
    AllocationFailure(usize),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid frame layout: {0}")]
    InvalidLayout(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{stage} failed: {message}")]
    StreamSetup { stage: SetupStage, message: String },

    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("write to output failed: {0}")]
    OutputWrite(String),

    #[error("no {0} stream is enabled")]
    UnsupportedKind(MediaKind),

    #[error("pipeline stopped")]
    PipelineStopped,

    #[error("encode worker panicked")]
    WorkerPanicked,
}

impl EncodeError {
    pub(crate) fn setup(stage: SetupStage, err: anyhow::Error) -> Self {
        EncodeError::StreamSetup {
            stage,
            message: format!("{:#}", err),
        }
    }
}
