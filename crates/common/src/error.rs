//! Error types shared across Slotreel crates.

/// Top-level error type for Slotreel operations.
///
/// Library crates keep their own typed errors; this is what they collapse
/// into at the command-line edge.
#[derive(Debug, thiserror::Error)]
pub enum SlotreelError {
    #[error("Assembly error: {message}")]
    Assembly { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Project error: {message}")]
    Project { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias using SlotreelError.
pub type SlotreelResult<T> = Result<T, SlotreelError>;

impl SlotreelError {
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn project(msg: impl Into<String>) -> Self {
        Self::Project {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
