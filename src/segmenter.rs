use crate::segments::{LineSegment, ParagraphSegment, WordSegment};
use crate::style::WORD_HEIGHT_THRESHOLD;

const LINE_GAP_CHAR_WIDTHS: f64 = 1.5;
const PARAGRAPH_GAP_RATIO: f64 = 0.95;

/// Groups OCR words (in emission order) into lines, then lines into paragraphs.
pub fn segment(words: Vec<WordSegment>) -> Vec<ParagraphSegment> {
    let mut lines = group_lines(words);
    // stable: equal tops keep emission order
    lines.sort_by_key(|line| line.position().map(|position| position.top).unwrap_or(i32::MAX));
    group_paragraphs(lines)
}

fn group_lines(words: Vec<WordSegment>) -> Vec<LineSegment> {
    let mut lines: Vec<LineSegment> = Vec::new();
    for word in words {
        let joins = lines
            .last()
            .and_then(|line| line.words.last())
            .is_some_and(|previous| is_same_line(previous, &word));
        match lines.last_mut() {
            Some(line) if joins => line.words.push(word),
            _ => lines.push(LineSegment::new(vec![word])),
        }
    }
    lines
}

fn is_same_line(previous: &WordSegment, current: &WordSegment) -> bool {
    let prev = &previous.position;
    let cur = &current.position;
    if prev.left > cur.left {
        return false;
    }
    let middle = cur.middle();
    if middle <= prev.top || middle >= prev.bottom {
        return false;
    }
    let char_width = previous.char_width().max(current.char_width()) as f64;
    let tolerance = (char_width * LINE_GAP_CHAR_WIDTHS) as i32;
    prev.right >= cur.left - tolerance
}

/// Each line goes to the first paragraph whose last line continues into it.
fn group_paragraphs(lines: Vec<LineSegment>) -> Vec<ParagraphSegment> {
    let mut paragraphs: Vec<ParagraphSegment> = Vec::new();
    for line in lines {
        let target = paragraphs.iter().position(|paragraph| {
            paragraph
                .lines
                .last()
                .is_some_and(|last| is_same_paragraph(last, &line))
        });
        match target {
            Some(index) => paragraphs[index].lines.push(line),
            None => paragraphs.push(ParagraphSegment::new(vec![line])),
        }
    }
    paragraphs
}

fn is_same_paragraph(previous: &LineSegment, current: &LineSegment) -> bool {
    let (Some(prev), Some(cur)) = (previous.position(), current.position()) else {
        return false;
    };
    let prev_height = prev.height();
    let overlaps = prev.horizontally_overlaps(&cur);
    let close = prev.bottom + (prev_height as f64 * PARAGRAPH_GAP_RATIO) as i32 >= cur.top;
    let similar_height =
        ((cur.height() - prev_height) as f64).abs() <= prev_height as f64 * WORD_HEIGHT_THRESHOLD;
    overlaps && close && similar_height
}
