use crate::geometry::row_regions;
use crate::translate::TranslatedLine;

use super::font::TextMeasurer;

/// Used when neither a detected size nor a style height is available.
pub const DEFAULT_FONT_SIZE: f64 = 12.0;

/// Largest size not above `original` at which `text` fits `width × height`.
///
/// Returns `original` when it already fits; otherwise binary-searches the
/// integer sizes in `[1, original]`. The result is at least 1 px and never
/// above `original`, so an original below 1 px that does not fit comes back
/// unchanged.
pub fn fit_font_size(
    measurer: &dyn TextMeasurer,
    font_weight: u32,
    text: &str,
    original: f64,
    width: f64,
    height: f64,
) -> f64 {
    let fits = |size: f64| {
        let (measured_width, measured_height) = measurer.measure(text, size, font_weight);
        measured_width <= width && measured_height <= height
    };
    if fits(original) {
        return original;
    }
    let mut low = 1i64;
    let mut high = original.floor() as i64;
    while low <= high {
        let mid = (low + high) / 2;
        if fits(mid as f64) {
            low = mid + 1;
        } else {
            high = mid - 1;
        }
    }
    (high.max(1) as f64).min(original)
}

/// Fits one size for the whole line into the row regions of its slots and
/// caps every word at it.
pub fn resize_font(measurer: &dyn TextMeasurer, mut line: TranslatedLine) -> TranslatedLine {
    let Some(first) = line.words.first() else {
        return line;
    };
    let regions = row_regions(&line.slots);
    let total_width: f64 = regions.iter().map(|region| f64::from(region.width())).sum();
    let max_height = regions
        .iter()
        .map(|region| f64::from(region.height()))
        .fold(0.0, f64::max);
    let sentence = line
        .words
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let font_weight = first.font_weight();
    let original = line
        .words
        .iter()
        .filter_map(|word| word.font_size)
        .find(|size| *size > 0.0)
        .or_else(|| {
            first
                .style
                .map(|style| f64::from(style.height))
                .filter(|height| *height > 0.0)
        })
        .unwrap_or(DEFAULT_FONT_SIZE);

    let fitted = fit_font_size(measurer, font_weight, &sentence, original, total_width, max_height);
    for word in &mut line.words {
        let own = word.font_size.filter(|size| *size > 0.0).unwrap_or(fitted);
        word.font_size = Some(own.min(fitted));
    }
    line
}
