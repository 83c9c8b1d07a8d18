use std::path::PathBuf;

use crate::media::DiscFormat;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while scanning, building or running conversion jobs
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// ffprobe failed to run or returned output we could not parse
    #[error("probe failed for {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    /// A probed field could not be coerced into its numeric/time form
    #[error("cannot parse {field} from {value:?}: {message}")]
    Format {
        field: String,
        value: String,
        message: String,
    },

    /// A configured disc-format folder is absent
    #[error("media directory does not exist: {}", path.display())]
    MissingDirectory { path: PathBuf },

    /// No preset is configured for the record's disc format
    #[error("no preset configured for disc format {format}")]
    UnknownPreset { format: DiscFormat },

    /// The encoder exited with a non-zero status
    #[error("encoding failed for {} ({status})", path.display())]
    EncodeFailed { path: PathBuf, status: String },

    /// Moving the source into the archive folder failed after a successful encode
    #[error("failed to archive {} -> {}: {message}", from.display(), to.display())]
    ArchiveMove {
        from: PathBuf,
        to: PathBuf,
        message: String,
    },
}

impl Error {
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn format(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Format {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn archive_move(
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::ArchiveMove {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }
}
