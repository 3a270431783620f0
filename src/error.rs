//! Error kinds shared by the library and the binary.

use std::path::PathBuf;

pub type CineResult<T> = Result<T, CineError>;

/// Every failure the rendering pipeline can report. All of them are fatal to a run.
#[derive(thiserror::Error, Debug)]
pub enum CineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource error: {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("external tool error: {0}")]
    ExternalTool(String),

    #[error("decode error: {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn external_tool(msg: impl Into<String>) -> Self {
        Self::ExternalTool(msg.into())
    }

    pub fn resource(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }

    /// I/O failures from the image crate are resource errors, the rest are decode errors.
    pub fn from_image(path: impl Into<PathBuf>, err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(source) => Self::resource(path, source),
            other => Self::decode(path, other),
        }
    }
}
