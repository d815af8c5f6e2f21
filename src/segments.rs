use serde::Serialize;

use crate::geometry::{Position, union_all};
use crate::style::Style;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordSegment {
    pub text: String,
    pub position: Position,
    pub font_size: Option<f64>,
    pub style: Option<Style>,
}

impl WordSegment {
    pub fn new(text: impl Into<String>, position: Position) -> Self {
        Self {
            text: text.into(),
            position,
            font_size: None,
            style: None,
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_font_size(mut self, font_size: f64) -> Self {
        self.font_size = Some(font_size);
        self
    }

    /// Average width of one letter; non-letters do not count. Never divides by zero.
    pub fn char_width(&self) -> i32 {
        let letters = self.text.chars().filter(|ch| ch.is_alphabetic()).count() as i32;
        self.position.width() / letters.max(1)
    }

    pub fn font_weight(&self) -> u32 {
        self.style
            .as_ref()
            .map(|style| style.font_weight)
            .unwrap_or(crate::style::REGULAR_WEIGHT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineSegment {
    pub words: Vec<WordSegment>,
}

impl LineSegment {
    pub fn new(words: Vec<WordSegment>) -> Self {
        Self { words }
    }

    pub fn position(&self) -> Option<Position> {
        union_all(self.words.iter().map(|word| &word.position))
    }

    /// Word texts concatenated as detected; tokens carry their own spacing.
    pub fn text(&self) -> String {
        self.words.iter().map(|word| word.text.as_str()).collect()
    }

    pub fn joined_text(&self, separator: &str) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParagraphSegment {
    pub lines: Vec<LineSegment>,
}

impl ParagraphSegment {
    pub fn new(lines: Vec<LineSegment>) -> Self {
        Self { lines }
    }

    pub fn words(&self) -> impl Iterator<Item = &WordSegment> {
        self.lines.iter().flat_map(|line| line.words.iter())
    }

    pub fn position(&self) -> Option<Position> {
        union_all(self.words().map(|word| &word.position))
    }

    /// Words joined by a space, lines by a newline.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.joined_text(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn flatten_lines(paragraphs: Vec<ParagraphSegment>) -> Vec<LineSegment> {
    paragraphs
        .into_iter()
        .flat_map(|paragraph| paragraph.lines)
        .collect()
}
