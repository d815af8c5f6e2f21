//! OCR collaborator boundary.
//!
//! Two shapes of OCR output are consumed: a plain page/block/paragraph/word
//! hierarchy ([`TextAnnotation`]) and a token list carrying style hints
//! ([`Document`]). Both are converted into [`WordSegment`]s in emission order.

mod bands;
mod document;
mod hocr;
mod tesseract;

use anyhow::Result;
use futures_util::future::BoxFuture;
use serde::Serialize;

use crate::geometry::{Position, Vertex};
use crate::segments::WordSegment;
use crate::style::{Rgb, Style};

pub use bands::{DEFAULT_BAND_HEIGHT, detect_in_bands, offset_annotation, split_points};
pub use document::TesseractDocument;
pub use hocr::{HocrPage, parse_hocr};
pub use tesseract::{Tesseract, list_tesseract_languages};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextAnnotation {
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Page {
    pub width: u32,
    pub height: u32,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Block {
    pub bounding_poly: Vec<Vertex>,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Paragraph {
    pub bounding_poly: Vec<Vertex>,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Word {
    pub text: String,
    pub bounding_poly: Vec<Vertex>,
}

impl TextAnnotation {
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.pages
            .iter()
            .flat_map(|page| page.blocks.iter())
            .flat_map(|block| block.paragraphs.iter())
    }

    /// Words in emission order, without style hints.
    pub fn to_word_segments(&self) -> Vec<WordSegment> {
        self.paragraphs()
            .flat_map(|paragraph| paragraph.words.iter())
            .filter_map(|word| {
                let position = Position::from_vertices(&word.bounding_poly)?;
                Some(WordSegment::new(word.text.clone(), position))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub pages: Vec<DocumentPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentPage {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub text: String,
    pub bounding_poly: Vec<Vertex>,
    pub style: TokenStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TokenStyle {
    pub pixel_font_size: f64,
    pub text_color: Rgb,
    pub bold: bool,
    /// 0 when the provider did not report a weight.
    pub font_weight: u32,
}

impl Document {
    /// Words in emission order with style and detected font size attached.
    pub fn to_word_segments(&self) -> Vec<WordSegment> {
        self.pages
            .iter()
            .flat_map(|page| page.tokens.iter())
            .filter_map(|token| {
                let position = Position::from_vertices(&token.bounding_poly)?;
                let hints = &token.style;
                let style = Style::new(
                    hints.text_color,
                    position.height(),
                    Style::resolve_font_weight(hints.font_weight, hints.bold),
                );
                let text = token.text.strip_suffix('\n').unwrap_or(&token.text);
                let mut word = WordSegment::new(text, position).with_style(style);
                if hints.pixel_font_size > 0.0 {
                    word = word.with_font_size(hints.pixel_font_size);
                }
                Some(word)
            })
            .collect()
    }
}

/// Word-level text detection.
pub trait OcrProvider: Send + Sync {
    fn detect_text<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<TextAnnotation>>;
}

/// Text detection with per-token style hints.
pub trait DocumentOcrProvider: Send + Sync {
    fn process_document<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<Document>>;
}

pub(crate) fn rect_vertices(position: &Position) -> Vec<Vertex> {
    vec![
        Vertex::new(position.left, position.top),
        Vertex::new(position.right, position.top),
        Vertex::new(position.right, position.bottom),
        Vertex::new(position.left, position.bottom),
    ]
}
