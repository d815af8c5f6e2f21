use crate::languages::is_only_symbol;
use crate::segments::{LineSegment, ParagraphSegment, WordSegment};

use super::{
    LINE_COLOR_THRESHOLD, LINE_GRAYSCALE_COLOR_THRESHOLD, LINE_HEIGHT_THRESHOLD, Style,
    WORD_COLOR_THRESHOLD, WORD_HEIGHT_THRESHOLD,
};

/// Builds style runs inside every paragraph.
///
/// Within a line, adjacent gray/black fragments are merged first, then
/// fragments with similar height and color. Afterwards a uniformly styled line
/// adopts the style of the uniformly styled line above it when the two look alike.
pub fn unify(paragraphs: Vec<ParagraphSegment>) -> Vec<ParagraphSegment> {
    paragraphs.into_iter().map(unify_paragraph).collect()
}

fn unify_paragraph(paragraph: ParagraphSegment) -> ParagraphSegment {
    let mut lines: Vec<LineSegment> = Vec::with_capacity(paragraph.lines.len());
    for line in paragraph.lines {
        let line = merge_similar_words(merge_grayish_words(line));
        let adopted = lines
            .last()
            .filter(|previous| should_adopt_line_style(previous, &line))
            .and_then(|previous| previous.words.last())
            .map(|word| word.style);
        let line = match adopted {
            Some(style) => LineSegment::new(
                line.words
                    .into_iter()
                    .map(|word| WordSegment { style, ..word })
                    .collect(),
            ),
            None => line,
        };
        lines.push(line);
    }
    ParagraphSegment::new(lines)
}

fn merge_grayish_words(line: LineSegment) -> LineSegment {
    fold_line(line, |previous, current| {
        is_grayish(previous) && is_grayish(current)
    })
}

fn merge_similar_words(line: LineSegment) -> LineSegment {
    fold_line(line, should_merge_words)
}

fn fold_line(
    line: LineSegment,
    should_merge: impl Fn(&WordSegment, &WordSegment) -> bool,
) -> LineSegment {
    let mut words: Vec<WordSegment> = Vec::with_capacity(line.words.len());
    for word in line.words {
        match words.last_mut() {
            Some(last) if should_merge(last, &word) => {
                *last = merge_words(last, &word);
            }
            _ => words.push(word),
        }
    }
    LineSegment::new(words)
}

fn is_grayish(word: &WordSegment) -> bool {
    word.style.as_ref().is_some_and(Style::is_grayish)
}

fn is_symbol_word(word: &WordSegment) -> bool {
    is_only_symbol(word.text.trim())
}

fn should_merge_words(previous: &WordSegment, current: &WordSegment) -> bool {
    if is_symbol_word(previous) || is_symbol_word(current) {
        return true;
    }
    match (&previous.style, &current.style) {
        (Some(prev), Some(cur)) => {
            prev.is_similar(cur, WORD_HEIGHT_THRESHOLD, WORD_COLOR_THRESHOLD)
        }
        _ => false,
    }
}

/// Joins two adjacent fragments into one. A symbol-only side takes the other
/// side's style untouched.
pub fn merge_words(previous: &WordSegment, current: &WordSegment) -> WordSegment {
    let style = if is_symbol_word(previous) {
        current.style
    } else if is_symbol_word(current) {
        previous.style
    } else {
        match (&previous.style, &current.style) {
            (Some(prev), Some(cur)) => Some(prev.merge(cur)),
            (prev, cur) => (*prev).or(*cur),
        }
    };
    WordSegment {
        text: format!("{}{}", previous.text, current.text),
        position: previous.position.union(&current.position),
        font_size: previous.font_size,
        style,
    }
}

fn is_uniform(line: &LineSegment) -> bool {
    match line.words.last() {
        Some(last) => line.words.iter().all(|word| word.style == last.style),
        None => false,
    }
}

fn should_adopt_line_style(previous: &LineSegment, current: &LineSegment) -> bool {
    if !is_uniform(previous) || !is_uniform(current) {
        return false;
    }
    let (Some(prev), Some(cur)) = (
        previous.words.last().and_then(|word| word.style.as_ref()),
        current.words.last().and_then(|word| word.style.as_ref()),
    ) else {
        return false;
    };
    let height_diff = (prev.height - cur.height).abs() as f64;
    if height_diff > prev.height as f64 * LINE_HEIGHT_THRESHOLD {
        return false;
    }
    let threshold = if prev.text_color.is_grayscale() && cur.text_color.is_grayscale() {
        LINE_GRAYSCALE_COLOR_THRESHOLD
    } else {
        LINE_COLOR_THRESHOLD
    };
    prev.color_distance(cur) <= threshold
}
