//! Error type shared by every simulation front-end.

use std::path::PathBuf;

/// Everything that can end a simulation run early.
///
/// The `Display` text of each variant is the message the binaries print
/// after `ERROR: `.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("{}: file not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("Not an RZX file")]
    NotRzx,

    #[error("Not an SZX file")]
    NotSzx,

    /// Truncated or malformed container.
    #[error("Invalid {format} file: {detail}")]
    Invalid { format: &'static str, detail: String },

    #[error("Unsupported machine type")]
    UnsupportedMachine,

    #[error("Unsupported block(s) ({}) in SZX snapshot", .0.join(", "))]
    UnsupportedSzxBlocks(Vec<String>),

    #[error("Missing snapshot (external file)")]
    ExternalSnapshot,

    #[error("Missing snapshot")]
    MissingSnapshot,

    #[error("Unsupported snapshot type")]
    UnsupportedSnapshotType,

    #[error("Unknown file type: {0}")]
    UnknownFileType(String),

    #[error("Port readings exhausted for frame {0}")]
    PortReadingsExhausted(usize),

    #[error("{left} port reading(s) left for frame {frame}")]
    PortReadingsLeft { left: usize, frame: usize },

    #[error("Unknown accelerator: {0}")]
    UnknownAccelerator(String),

    #[error("Invalid register: {0}")]
    InvalidRegister(String),

    #[error("Cannot parse register value: {0}")]
    BadRegisterValue(String),

    #[error("Invalid integer: {0}")]
    BadInteger(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Shorthand for [`SimError::Invalid`].
    pub(crate) fn invalid(format: &'static str, detail: impl Into<String>) -> Self {
        Self::Invalid {
            format,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_cli_output() {
        assert_eq!(
            SimError::FileNotFound(PathBuf::from("in.rzx")).to_string(),
            "in.rzx: file not found"
        );
        assert_eq!(
            SimError::PortReadingsLeft { left: 1, frame: 0 }.to_string(),
            "1 port reading(s) left for frame 0"
        );
        assert_eq!(
            SimError::UnsupportedSzxBlocks(vec!["IF1".into(), "ZXPR".into()]).to_string(),
            "Unsupported block(s) (IF1, ZXPR) in SZX snapshot"
        );
        assert_eq!(
            SimError::invalid("TAP", "truncated block").to_string(),
            "Invalid TAP file: truncated block"
        );
    }
}
