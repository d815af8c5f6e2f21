use std::collections::VecDeque;

use crate::geometry::{Position, row_regions};
use crate::segments::WordSegment;

use super::fit::DEFAULT_FONT_SIZE;
use super::font::TextMeasurer;

/// Flows `words` left to right through the row regions of `slots`.
///
/// Each word is measured with one trailing space. A word that does not fit
/// the rest of a region is split at the longest fitting character prefix;
/// the prefix fills the region and the remainder starts the next one.
/// Whatever is left after the last region is dropped.
pub fn reposition_text(
    measurer: &dyn TextMeasurer,
    slots: &[Position],
    words: &[WordSegment],
) -> Vec<WordSegment> {
    let mut queue: VecDeque<WordSegment> = words
        .iter()
        .map(|word| WordSegment {
            text: format!("{} ", word.text),
            ..word.clone()
        })
        .collect();
    let mut placed = Vec::new();

    for region in row_regions(slots) {
        if queue.is_empty() {
            break;
        }
        let mut left = region.left;
        let mut remain = region.width();

        while let Some(word) = queue.pop_front() {
            let size = word.font_size.unwrap_or(DEFAULT_FONT_SIZE);
            let font_weight = word.font_weight();
            let (width, _) = measurer.measure(&word.text, size, font_weight);

            if width <= f64::from(remain) {
                let advance = width as i32;
                placed.push(WordSegment {
                    position: Position::new(region.top, left, region.bottom, left + advance),
                    ..word
                });
                left += advance;
                remain -= advance;
                continue;
            }

            let chars: Vec<char> = word.text.chars().collect();
            let count = fitting_prefix(&chars, |prefix| {
                measurer.measure(prefix, size, font_weight).0 <= f64::from(remain)
            });
            let head: String = chars[..count].iter().collect();
            let tail: String = chars[count..].iter().collect();
            if !head.is_empty() {
                placed.push(WordSegment {
                    text: head,
                    position: Position::new(region.top, left, region.bottom, region.right),
                    ..word.clone()
                });
            }
            queue.push_front(WordSegment { text: tail, ..word });
            break;
        }
    }
    placed
}

/// Longest `k` such that the first `k` characters fit. Widths grow with `k`.
fn fitting_prefix(chars: &[char], fits: impl Fn(&str) -> bool) -> usize {
    let mut low = 0;
    let mut high = chars.len();
    while low < high {
        let mid = (low + high).div_ceil(2);
        let prefix: String = chars[..mid].iter().collect();
        if fits(&prefix) {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}
