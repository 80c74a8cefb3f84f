//! Ad-detection results reported by a browser backend.
//!
//! A backend returns an [`AdReport`] for the current page. An empty report
//! means the page was inspected and no ads were found; a failed inspection is
//! reported as an error by the backend instead.

use crate::protocol::{Event, EventKind, Params};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event type name used when ad metadata is recorded into a sequence.
pub const AD_DETECTED_EVENT: &str = "ad_detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdKind {
    Iframe,
    Video,
    Image,
    Text,
}

impl AdKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdKind::Iframe => "iframe",
            AdKind::Video => "video",
            AdKind::Image => "image",
            AdKind::Text => "text",
        }
    }
}

impl fmt::Display for AdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdElement {
    pub position: AdPosition,
    pub kind: AdKind,
    #[serde(default)]
    pub text_length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdReport {
    #[serde(default)]
    pub ads: Vec<AdElement>,
}

/// The ad-related feature inputs derived from one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdMetadata {
    pub ad_position: f64,
    pub image_present: f64,
    pub video_present: f64,
    pub text_length: f64,
}

impl AdReport {
    pub fn count(&self) -> usize {
        self.ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }

    pub fn kinds(&self) -> Vec<AdKind> {
        self.ads.iter().map(|ad| ad.kind).collect()
    }

    /// Summarize the report. Returns `None` when no ads were found.
    pub fn metadata(&self) -> Option<AdMetadata> {
        let first = self.ads.first()?;
        let has = |kind: AdKind| {
            if self.ads.iter().any(|ad| ad.kind == kind) {
                1.0
            } else {
                0.0
            }
        };

        Some(AdMetadata {
            ad_position: first.position.y,
            image_present: has(AdKind::Image),
            video_present: has(AdKind::Video),
            text_length: self.ads.iter().map(|ad| ad.text_length as f64).sum(),
        })
    }
}

impl AdMetadata {
    /// Build the event that carries this metadata into a recorded sequence.
    pub fn to_event(&self) -> Event {
        let params = Params::from([
            ("ad_position".into(), self.ad_position.into()),
            ("image_present".into(), self.image_present.into()),
            ("video_present".into(), self.video_present.into()),
            ("text_length".into(), self.text_length.into()),
        ]);
        Event::new(EventKind::Other(AD_DETECTED_EVENT.to_string()), params)
    }
}
