//! Layout engine: fits one font size per translated line, flows the words
//! back into the line's original row regions and composes the result.

mod compose;
mod fit;
mod font;
mod reposition;

pub use compose::{compose_words, draw_numbered_boxes, encode_png};
pub use fit::{DEFAULT_FONT_SIZE, fit_font_size, resize_font};
pub use font::{
    DirectoryFontProvider, FontMetrics, FontProvider, FontSet, LanguageFonts, SystemFontProvider,
    TextMeasurer,
};
pub use reposition::reposition_text;

use crate::segments::WordSegment;
use crate::translate::TranslatedLine;

/// Resizes and repositions every line; the flat list is ready to draw.
pub fn layout_lines(measurer: &dyn TextMeasurer, lines: Vec<TranslatedLine>) -> Vec<WordSegment> {
    lines
        .into_iter()
        .map(|line| resize_font(measurer, line))
        .flat_map(|line| reposition_text(measurer, &line.slots, &line.words))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::test_util::MonospaceMeasurer;

    #[test]
    fn translated_words_fill_the_source_slots() {
        let slots = vec![Position::new(10, 0, 30, 60), Position::new(10, 70, 30, 120)];
        let line = TranslatedLine {
            words: vec![
                WordSegment::new("Hello", slots[1]).with_font_size(20.0),
                WordSegment::new("world", slots[0]).with_font_size(20.0),
            ],
            slots,
        };
        let placed = layout_lines(&MonospaceMeasurer, vec![line]);
        let texts: Vec<_> = placed.iter().map(|word| word.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello ", "world "]);
        // one region 120 wide; "Hello world" is 11 chars => 6.6 × s <= 120 and 1.2 × s <= 20
        assert_eq!(placed[0].font_size, Some(16.0));
        assert_eq!(placed[0].position.left, 0);
        assert!(placed.iter().all(|word| word.position.right <= 120));
    }
}
