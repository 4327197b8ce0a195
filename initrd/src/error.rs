use std::fmt;
use std::io;
use thiserror::Error;

/// Step of an injection run, reported when that step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Copy,
    Enumerate,
    Pack,
    Compress,
    Append,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Copy => "copy",
            PipelineStage::Enumerate => "enumerate",
            PipelineStage::Pack => "pack",
            PipelineStage::Compress => "compress",
            PipelineStage::Append => "append",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl InjectError {
    pub(crate) fn stage(stage: PipelineStage) -> impl FnOnce(io::Error) -> Self {
        move |source| InjectError::Stage { stage, source }
    }
}
