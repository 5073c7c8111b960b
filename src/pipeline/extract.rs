//! Image extraction with sticker and GIF filtering.

use serde_json::Value;

use crate::event::{MessageSegment, sticker_sub_type};

/// A still image to be audited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// True if the URL path (query stripped, case-insensitive) ends in `.gif`.
    pub fn is_animated(&self) -> bool {
        is_animated_url(&self.url)
    }
}

/// Result of walking a message's segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The message is a sticker; the whole event must be skipped.
    Sticker,
    /// Still images in message order (possibly none).
    Images(Vec<ImageRef>),
}

/// Extract auditable images from a message.
///
/// Any raw image segment with a non-zero sticker sub-type turns the whole
/// message into `Extraction::Sticker`, regardless of its other segments.
/// A segment whose sub-type cannot be read counts as not-a-sticker and the
/// scan moves on, so a readable sticker later in the message still aborts it.
pub fn extract_images(raw_segments: &[Value], segments: &[MessageSegment]) -> Extraction {
    if raw_segments
        .iter()
        .any(|seg| sticker_sub_type(seg).is_some_and(|sub| sub != 0))
    {
        return Extraction::Sticker;
    }

    let images = segments
        .iter()
        .filter_map(|seg| match seg {
            MessageSegment::Image { url: Some(url) } if !url.is_empty() => Some(url),
            _ => None,
        })
        .filter(|url| !is_animated_url(url))
        .map(|url| ImageRef::new(url.as_str()))
        .collect();

    Extraction::Images(images)
}

fn is_animated_url(url: &str) -> bool {
    let path = url.split('?').next().unwrap_or(url);
    path.to_lowercase().ends_with(".gif")
}
