use thiserror::Error;

/// Fatal conditions of a tracking run. Losing individual points is not an
/// error, see [`crate::optical_flow::TrackStatus`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Failed to open video source: {path}")]
    SourceOpen { path: String },

    #[error("Video source yielded no frames")]
    EmptySource,

    #[error("Unsupported frame format: {channels} channels of depth {depth}, expected 8-bit BGR")]
    UnsupportedFrame { channels: i32, depth: i32 },

    #[error("Frame buffer holds {found} bytes, expected {expected}")]
    FrameBuffer { expected: usize, found: usize },

    #[error("Frame size changed from {expected:?} to {found:?}")]
    FrameSizeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
