use std::path::{Path, PathBuf};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised while preparing blobs or driving a training run.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The annotation file derived from an image path does not exist.
    #[error("Annotation file does not exist: {}", .path.display())]
    MissingAnnotationFile { path: PathBuf },

    /// An annotation line did not hold 8 numeric fields. Invalidates the whole file.
    #[error("Malformed annotation on line {line}{}: {reason}", in_path(.path))]
    MalformedAnnotationLine {
        path: Option<PathBuf>,
        line: usize,
        reason: String,
    },

    /// The image file is missing or could not be decoded.
    #[error("Failed to read image {}. {source}", .path.display())]
    UnreadableImage {
        path: PathBuf,
        source: image::ImageError,
    },

    /// The image has a zero dimension, so no scale factor exists.
    #[error("Cannot rescale an empty image of {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("I/O error{}. {source}", in_path(.path))]
    Io {
        path: Option<PathBuf>,
        source: std::io::Error,
    },

    #[error("Cannot train on an empty blob collection")]
    EmptyCollection,

    /// Raised by the external trainable model.
    #[error("Model error. {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn io(path: Option<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path, source }
    }

    pub(crate) fn model<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Model(Box::new(err))
    }

    /// Attaches a file path to errors raised while reading an unnamed source.
    pub(crate) fn with_path(self, file: &Path) -> Self {
        match self {
            Self::MalformedAnnotationLine {
                path: None,
                line,
                reason,
            } => Self::MalformedAnnotationLine {
                path: Some(file.to_path_buf()),
                line,
                reason,
            },
            Self::Io { path: None, source } => Self::Io {
                path: Some(file.to_path_buf()),
                source,
            },
            other => other,
        }
    }

    /// Whether the error belongs to a single image/annotation pair. Directory mode skips
    /// entries failing with these and keeps going.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::MissingAnnotationFile { .. }
                | Self::MalformedAnnotationLine { .. }
                | Self::UnreadableImage { .. }
                | Self::EmptyImage { .. }
                | Self::Io { .. }
        )
    }
}

fn in_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}
