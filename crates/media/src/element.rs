//! Capability interface over the media element kinds.
//!
//! Images and videos differ in where their source lives, how their intrinsic
//! size is read, how a source is reattached and which signal means "ready".
//! Everything else in this crate goes through [`MediaElement`].

use dom::{Document, MediaSignal, NodeKey, Size, describe};

use crate::error::MediaError;

/// Operations the loader needs from a deferrable media element.
pub trait MediaElement {
    fn node(&self) -> NodeKey;

    /// Intrinsic dimensions, once known.
    fn intrinsic_size(&self, doc: &dyn Document) -> Option<Size>;

    /// The source the element would load right now, if any.
    fn active_source(&self, doc: &dyn Document) -> Option<String>;

    /// Point the element at `src` (and `srcset` when given) so the platform
    /// starts fetching it.
    fn attach_source(&self, doc: &mut dyn Document, src: &str, srcset: Option<&str>);

    /// Whether `signal` is this element's ready signal.
    fn is_ready(&self, signal: &MediaSignal) -> bool;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|src| !src.is_empty())
}

/// `<img>`: declared `src` or the resolved current source; ready on decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageElement(pub NodeKey);

impl MediaElement for ImageElement {
    fn node(&self) -> NodeKey {
        self.0
    }

    fn intrinsic_size(&self, doc: &dyn Document) -> Option<Size> {
        doc.natural_size(self.0)
    }

    fn active_source(&self, doc: &dyn Document) -> Option<String> {
        non_empty(doc.attribute(self.0, "src")).or_else(|| non_empty(doc.current_src(self.0)))
    }

    fn attach_source(&self, doc: &mut dyn Document, src: &str, srcset: Option<&str>) {
        // The candidate list must be in place before `src` triggers a fetch.
        if let Some(srcset) = srcset {
            doc.set_attribute(self.0, "srcset", srcset);
        }
        doc.set_attribute(self.0, "src", src);
    }

    fn is_ready(&self, signal: &MediaSignal) -> bool {
        matches!(signal, MediaSignal::Decoded)
    }
}

/// `<video>`: declared `src` only; needs an explicit `load()`; ready on the
/// first decoded frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VideoElement(pub NodeKey);

impl MediaElement for VideoElement {
    fn node(&self) -> NodeKey {
        self.0
    }

    fn intrinsic_size(&self, doc: &dyn Document) -> Option<Size> {
        doc.video_size(self.0)
    }

    fn active_source(&self, doc: &dyn Document) -> Option<String> {
        non_empty(doc.attribute(self.0, "src"))
    }

    fn attach_source(&self, doc: &mut dyn Document, src: &str, srcset: Option<&str>) {
        if let Some(srcset) = srcset {
            doc.set_attribute(self.0, "srcset", srcset);
        }
        doc.set_attribute(self.0, "src", src);
        doc.load_media(self.0);
    }

    fn is_ready(&self, signal: &MediaSignal) -> bool {
        matches!(signal, MediaSignal::FirstFrame)
    }
}

/// Wrap `node` in the capability matching its tag.
///
/// # Errors
/// [`MediaError::UnsupportedElement`] for anything other than `img` or `video`.
pub fn media_for(doc: &dyn Document, node: NodeKey) -> Result<Box<dyn MediaElement>, MediaError> {
    match doc.tag_name(node).as_deref() {
        Some("img") => Ok(Box::new(ImageElement(node))),
        Some("video") => Ok(Box::new(VideoElement(node))),
        Some(tag) => Err(MediaError::UnsupportedElement { tag: tag.to_owned() }),
        None => Err(MediaError::UnsupportedElement {
            tag: describe(doc, node),
        }),
    }
}
