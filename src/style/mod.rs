//! Visual style of detected text and the rules that decide when two fragments
//! belong to the same style run.

mod color;
mod unify;

use serde::Serialize;

pub use color::{BLACK, GRAY, Rgb, SILVER};
pub use unify::{merge_words, unify};

pub const REGULAR_WEIGHT: u32 = 400;
pub const SEMIBOLD_WEIGHT: u32 = 600;
pub const BOLD_WEIGHT: u32 = 700;

/// Word-level color merge threshold.
pub const WORD_COLOR_THRESHOLD: f64 = 0.239;
/// Line-level color merge threshold.
pub const LINE_COLOR_THRESHOLD: f64 = 0.08;
/// Line-level threshold when both colors are near-gray.
pub const LINE_GRAYSCALE_COLOR_THRESHOLD: f64 = 0.35;
/// Allowed height difference between adjacent words, relative to the first.
pub const WORD_HEIGHT_THRESHOLD: f64 = 0.4;
/// Allowed height difference between adjacent lines, relative to the first.
pub const LINE_HEIGHT_THRESHOLD: f64 = 0.125;
/// Distance below which a color counts as one of the gray anchors.
pub const GRAY_ANCHOR_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Style {
    pub text_color: Rgb,
    pub height: i32,
    /// Number of fragments merged into this style so far.
    pub weight: u32,
    /// CSS-like font weight.
    pub font_weight: u32,
}

impl Style {
    pub fn new(text_color: Rgb, height: i32, font_weight: u32) -> Self {
        Self {
            text_color,
            height,
            weight: 1,
            font_weight,
        }
    }

    /// Resolves a provider font weight where 0 means "not reported".
    pub fn resolve_font_weight(reported: u32, bold: bool) -> u32 {
        match (reported, bold) {
            (0, true) => BOLD_WEIGHT,
            (0, false) => REGULAR_WEIGHT,
            (weight, _) => weight,
        }
    }

    pub fn is_grayish(&self) -> bool {
        [BLACK, GRAY, SILVER]
            .iter()
            .any(|anchor| self.text_color.distance_ciede2000(anchor) < GRAY_ANCHOR_THRESHOLD)
    }

    pub fn color_distance(&self, other: &Style) -> f64 {
        self.text_color.distance_ciede2000(&other.text_color)
    }

    /// Height within `height_threshold` of `self` and color within `color_threshold`.
    pub fn is_similar(&self, other: &Style, height_threshold: f64, color_threshold: f64) -> bool {
        let height_diff = (self.height - other.height).abs() as f64;
        if height_diff > self.height as f64 * height_threshold {
            return false;
        }
        self.color_distance(other) <= color_threshold
    }

    /// Weighted merge: the side with more merged fragments pulls the color harder.
    pub fn merge(&self, other: &Style) -> Style {
        let total = self.weight + other.weight;
        let t = if total == 0 {
            0.5
        } else {
            other.weight as f64 / total as f64
        };
        Style {
            text_color: self.text_color.blend_hsv(&other.text_color, t),
            height: (self.height + other.height) / 2,
            weight: total,
            font_weight: self.font_weight,
        }
    }
}
