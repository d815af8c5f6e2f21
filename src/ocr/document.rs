use anyhow::{Context, Result};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use image::{DynamicImage, Rgb as Pixel, RgbImage};

use crate::geometry::Position;
use crate::style::{BLACK, Rgb};

use super::hocr::HocrPage;
use super::tesseract::Tesseract;
use super::{Document, DocumentOcrProvider, DocumentPage, Token, TokenStyle, rect_vertices};

/// Share of a word box's pixels, farthest from the background, averaged into
/// the text color.
const INK_SHARE: f64 = 0.2;

/// Tesseract-backed document OCR that estimates per-word styling from pixels.
#[derive(Debug, Clone)]
pub struct TesseractDocument {
    tesseract: Tesseract,
}

impl TesseractDocument {
    pub fn new(tesseract: Tesseract) -> Self {
        Self { tesseract }
    }
}

impl DocumentOcrProvider for TesseractDocument {
    fn process_document<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<Document>> {
        async move {
            let decoded =
                image::load_from_memory(image).with_context(|| "failed to decode image for OCR")?;
            let pages = self.tesseract.recognize(image).await?;
            Ok(build_document(&pages, &decoded))
        }
        .boxed()
    }
}

/// One token per word; words followed by another word on the same line keep a
/// trailing space so concatenated runs read naturally.
pub(crate) fn build_document(pages: &[HocrPage], image: &DynamicImage) -> Document {
    let rgb = image.to_rgb8();
    let pages = pages
        .iter()
        .map(|page| {
            let mut tokens = Vec::new();
            let lines = page
                .blocks
                .iter()
                .flat_map(|block| block.paragraphs.iter())
                .flat_map(|paragraph| paragraph.lines.iter());
            for line in lines {
                let count = line.words.len();
                for (index, word) in line.words.iter().enumerate() {
                    let text = if index + 1 < count {
                        format!("{} ", word.text)
                    } else {
                        word.text.clone()
                    };
                    tokens.push(Token {
                        text,
                        bounding_poly: rect_vertices(&word.bbox),
                        style: TokenStyle {
                            pixel_font_size: line.x_size.unwrap_or(0.0),
                            text_color: sample_text_color(&rgb, &word.bbox),
                            bold: word.bold,
                            font_weight: 0,
                        },
                    });
                }
            }
            DocumentPage { tokens }
        })
        .collect();
    Document { pages }
}

/// Estimates ink color inside `bbox`: the border pixels give the background and
/// the pixels most distant from it are averaged.
pub(crate) fn sample_text_color(image: &RgbImage, bbox: &Position) -> Rgb {
    let (width, height) = image.dimensions();
    let left = bbox.left.clamp(0, width as i32) as u32;
    let right = bbox.right.clamp(0, width as i32) as u32;
    let top = bbox.top.clamp(0, height as i32) as u32;
    let bottom = bbox.bottom.clamp(0, height as i32) as u32;
    if right <= left || bottom <= top {
        return BLACK;
    }
    let view = image::imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
    let (w, h) = view.dimensions();

    let mut border = [0f64; 3];
    let mut border_count = 0f64;
    for (x, y, pixel) in view.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            accumulate(&mut border, pixel);
            border_count += 1.0;
        }
    }
    let background = border.map(|sum| sum / border_count.max(1.0));

    let mut ranked: Vec<(f64, &Pixel<u8>)> = view
        .pixels()
        .map(|pixel| {
            let distance = (0..3)
                .map(|c| (pixel[c] as f64 - background[c]).powi(2))
                .sum::<f64>();
            (distance, pixel)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    let take = ((ranked.len() as f64 * INK_SHARE).ceil() as usize).max(1);
    let mut ink = [0f64; 3];
    for (_, pixel) in ranked.iter().take(take) {
        accumulate(&mut ink, pixel);
    }
    let [r, g, b] = ink.map(|sum| sum / take as f64 / 255.0);
    Rgb::new(r, g, b)
}

fn accumulate(sum: &mut [f64; 3], pixel: &Pixel<u8>) {
    for c in 0..3 {
        sum[c] += pixel[c] as f64;
    }
}
