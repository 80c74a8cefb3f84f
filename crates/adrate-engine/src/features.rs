//! Fixed-schema feature extraction over recorded action sequences.
//!
//! The field order of [`FeatureVector`] is positional: the network's input
//! layer and the fitted scaler statistics are indexed by it, so it must not
//! change without bumping the model format version.

use adrate_common::protocol::{Event, EventKind};
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 7;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "scroll_distance",
    "time_spent",
    "click_count",
    "ad_position",
    "image_present",
    "video_present",
    "text_length",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub scroll_distance: f64,
    pub time_spent: f64,
    pub click_count: f64,
    pub ad_position: f64,
    pub image_present: f64,
    pub video_present: f64,
    pub text_length: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.scroll_distance,
            self.time_spent,
            self.click_count,
            self.ad_position,
            self.image_present,
            self.video_present,
            self.text_length,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [
            scroll_distance,
            time_spent,
            click_count,
            ad_position,
            image_present,
            video_present,
            text_length,
        ] = values;
        Self {
            scroll_distance,
            time_spent,
            click_count,
            ad_position,
            image_present,
            video_present,
            text_length,
        }
    }

    /// `(name, value)` pairs in schema order.
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        FEATURE_NAMES.into_iter().zip(self.to_array())
    }
}

/// Map a sequence to its feature vector. Pure and deterministic; never fails.
pub fn extract(sequence: &[Event]) -> FeatureVector {
    let mut features = FeatureVector::default();

    for event in sequence {
        match event.kind {
            EventKind::Scroll => {
                features.scroll_distance += event.number("amount").unwrap_or(0.0).abs();
            }
            EventKind::Click => features.click_count += 1.0,
            EventKind::Navigate | EventKind::Other(_) => {}
        }

        // Ad metadata may ride on any event; the most recent report wins.
        if let Some(v) = event.number("ad_position") {
            features.ad_position = v;
        }
        if let Some(v) = event.number("image_present") {
            features.image_present = v;
        }
        if let Some(v) = event.number("video_present") {
            features.video_present = v;
        }
        if let Some(v) = event.number("text_length") {
            features.text_length = v;
        }
    }

    if let [first, .., last] = sequence {
        features.time_spent = elapsed_seconds(first, last);
    }

    features
}

fn elapsed_seconds(first: &Event, last: &Event) -> f64 {
    let delta = last.timestamp - first.timestamp;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}
