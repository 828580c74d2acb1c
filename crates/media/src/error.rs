use thiserror::Error;

/// Per-element media failures. None of them abort a pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Neither a declared nor a resolved source exists.
    #[error("no source found for media {element}")]
    NoSourceFound { element: String },
    /// The platform reported an error while fetching or decoding.
    #[error("failed to load {src}: {reason}")]
    LoadFailure { src: String, reason: String },
    /// The element is not an image or a video.
    #[error("<{tag}> cannot be deferred")]
    UnsupportedElement { tag: String },
}
