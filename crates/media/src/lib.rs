//! Deferred images and videos.
//!
//! Media elements are stripped of their sources on discovery, restored once
//! they come near the viewport and then resized to a whole number of grid
//! rows so nothing below them falls off the rhythm.

pub mod element;
pub use element::{ImageElement, MediaElement, VideoElement, media_for};

mod error;
pub use error::MediaError;

pub mod loader;
pub use loader::{DeferredMediaLoader, LoadOutcome, LoaderOptions, MediaState, Registration};

pub mod vault;
pub use vault::{DORMANT_SRC, DORMANT_SRCSET, MediaRecord, MediaSourceVault};
