use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Vertex;

use super::{OcrProvider, TextAnnotation};

/// Tallest stretch of text handed to a single OCR call.
pub const DEFAULT_BAND_HEIGHT: i32 = 200;

/// Cut rows for band OCR, always starting at 0 and ending at `image_height`.
///
/// Walking paragraphs in annotation order, a paragraph whose bottom lies more
/// than `band_height` below the previous paragraph's bottom starts a new band
/// at that previous bottom.
pub fn split_points(annotation: &TextAnnotation, image_height: i32, band_height: i32) -> Vec<i32> {
    let mut points = vec![0];
    let mut current = 0;
    for paragraph in annotation.paragraphs() {
        let bottom = paragraph
            .bounding_poly
            .iter()
            .fold(0, |acc, vertex| acc.max(vertex.y));
        let last = points.last().copied().unwrap_or(0);
        if bottom - current > band_height && current > last && current < image_height {
            points.push(current);
        }
        current = bottom;
    }
    if points.last() != Some(&image_height) {
        points.push(image_height);
    }
    points
}

/// Shifts every block, paragraph and word polygon of `annotation` down by `dy`.
pub fn offset_annotation(annotation: &mut TextAnnotation, dy: i32) {
    let shift = |vertices: &mut Vec<Vertex>| {
        for vertex in vertices.iter_mut() {
            vertex.y += dy;
        }
    };
    for page in &mut annotation.pages {
        for block in &mut page.blocks {
            shift(&mut block.bounding_poly);
            for paragraph in &mut block.paragraphs {
                shift(&mut paragraph.bounding_poly);
                for word in &mut paragraph.words {
                    shift(&mut word.bounding_poly);
                }
            }
        }
    }
}

/// OCRs a tall image band by band.
///
/// The whole image is detected once to find the cut rows. When no cut is
/// needed that first result is returned as is. Otherwise the bands are cropped,
/// PNG-encoded and detected concurrently, each result is shifted back into
/// image coordinates, and the pages are concatenated in band order.
pub async fn detect_in_bands(
    provider: Arc<dyn OcrProvider>,
    image: &DynamicImage,
    bytes: &[u8],
    band_height: i32,
    max_concurrency: usize,
) -> Result<TextAnnotation> {
    let whole = provider
        .detect_text(bytes)
        .await
        .map_err(|err| Error::collaborator("ocr", err))?;
    let (width, height) = image.dimensions();
    let points = split_points(&whole, height as i32, band_height);
    if points.len() == 2 {
        return Ok(whole);
    }
    debug!("ocr bands: {:?}", points);

    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (index, window) in points.windows(2).enumerate() {
        let (start, end) = (window[0], window[1]);
        let band = image.crop_imm(0, start as u32, width, (end - start) as u32);
        let mut encoded = Vec::new();
        band.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .map_err(|err| Error::collaborator("ocr", err.into()))?;
        let provider = Arc::clone(&provider);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|err| Error::collaborator("ocr", err.into()))?;
            let mut annotation = provider
                .detect_text(&encoded)
                .await
                .map_err(|err| Error::collaborator("ocr", err))?;
            offset_annotation(&mut annotation, start);
            Ok::<_, Error>((index, annotation))
        });
    }

    let mut slots: Vec<Option<TextAnnotation>> = vec![None; points.len() - 1];
    while let Some(joined) = tasks.join_next().await {
        let (index, annotation) =
            joined.map_err(|err| Error::collaborator("ocr", err.into()))??;
        slots[index] = Some(annotation);
    }

    let pages = slots
        .into_iter()
        .flatten()
        .flat_map(|annotation| annotation.pages)
        .collect();
    Ok(TextAnnotation { pages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::ocr::{Block, Page, Paragraph, Word, rect_vertices};
    use anyhow::anyhow;
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use image::RgbaImage;

    fn paragraph(text: &str, position: Position) -> Paragraph {
        Paragraph {
            bounding_poly: rect_vertices(&position),
            words: vec![Word {
                text: text.to_string(),
                bounding_poly: rect_vertices(&position),
            }],
        }
    }

    fn annotation(paragraphs: Vec<Paragraph>) -> TextAnnotation {
        TextAnnotation {
            pages: vec![Page {
                width: 100,
                height: 400,
                blocks: vec![Block {
                    bounding_poly: Vec::new(),
                    paragraphs,
                }],
            }],
        }
    }

    /// Answers according to the height of the image it is given.
    struct BandOcr;

    impl OcrProvider for BandOcr {
        fn detect_text<'a>(
            &'a self,
            image: &'a [u8],
        ) -> BoxFuture<'a, anyhow::Result<TextAnnotation>> {
            async move {
                let decoded = image::load_from_memory(image)?;
                match decoded.height() {
                    400 => Ok(annotation(vec![
                        paragraph("top", Position::new(100, 0, 150, 50)),
                        paragraph("bottom", Position::new(300, 0, 380, 50)),
                    ])),
                    150 => Ok(annotation(vec![paragraph("top", Position::new(100, 0, 150, 50))])),
                    250 => Ok(annotation(vec![paragraph(
                        "bottom",
                        Position::new(150, 0, 230, 50),
                    )])),
                    other => Err(anyhow!("unexpected band height {other}")),
                }
            }
            .boxed()
        }
    }

    struct FailingOcr;

    impl OcrProvider for FailingOcr {
        fn detect_text<'a>(
            &'a self,
            _image: &'a [u8],
        ) -> BoxFuture<'a, anyhow::Result<TextAnnotation>> {
            async move { Err(anyhow!("vision unavailable")) }.boxed()
        }
    }

    fn blank_image(height: u32) -> (DynamicImage, Vec<u8>) {
        let image = DynamicImage::ImageRgba8(RgbaImage::new(100, height));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode");
        (image, bytes)
    }

    #[test]
    fn split_points_cut_at_previous_bottom() {
        let ann = annotation(vec![
            paragraph("a", Position::new(100, 0, 150, 50)),
            paragraph("b", Position::new(300, 0, 380, 50)),
        ]);
        assert_eq!(split_points(&ann, 400, DEFAULT_BAND_HEIGHT), vec![0, 150, 400]);
    }

    #[test]
    fn split_points_short_page_is_single_band() {
        let ann = annotation(vec![
            paragraph("a", Position::new(10, 0, 50, 50)),
            paragraph("b", Position::new(60, 0, 120, 50)),
        ]);
        assert_eq!(split_points(&ann, 180, DEFAULT_BAND_HEIGHT), vec![0, 180]);
        assert_eq!(split_points(&TextAnnotation::default(), 900, 200), vec![0, 900]);
    }

    #[test]
    fn split_points_never_repeat_a_cut() {
        // first paragraph already far below 0: the cut at 0 is not pushed twice
        let ann = annotation(vec![paragraph("a", Position::new(250, 0, 300, 50))]);
        assert_eq!(split_points(&ann, 400, DEFAULT_BAND_HEIGHT), vec![0, 400]);
    }

    #[test]
    fn offset_moves_every_level() {
        let mut ann = annotation(vec![paragraph("a", Position::new(0, 0, 10, 10))]);
        ann.pages[0].blocks[0].bounding_poly = rect_vertices(&Position::new(0, 0, 10, 10));
        offset_annotation(&mut ann, 150);
        let block = &ann.pages[0].blocks[0];
        assert_eq!(Position::from_vertices(&block.bounding_poly).map(|p| p.top), Some(150));
        assert_eq!(
            Position::from_vertices(&block.paragraphs[0].bounding_poly).map(|p| p.top),
            Some(150)
        );
        assert_eq!(
            Position::from_vertices(&block.paragraphs[0].words[0].bounding_poly),
            Some(Position::new(150, 0, 160, 10))
        );
    }

    #[tokio::test]
    async fn second_band_is_offset_by_its_start() {
        let (image, bytes) = blank_image(400);
        let merged = detect_in_bands(Arc::new(BandOcr), &image, &bytes, DEFAULT_BAND_HEIGHT, 4)
            .await
            .expect("bands");
        assert_eq!(merged.pages.len(), 2);
        let words = merged.to_word_segments();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "top");
        assert_eq!(words[0].position, Position::new(100, 0, 150, 50));
        assert_eq!(words[1].text, "bottom");
        assert_eq!(words[1].position, Position::new(300, 0, 380, 50));
    }

    #[tokio::test]
    async fn provider_failure_fails_the_call() {
        let (image, bytes) = blank_image(400);
        let err = detect_in_bands(Arc::new(FailingOcr), &image, &bytes, 200, 2)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::CollaboratorFailure { collaborator: "ocr", .. }));
    }
}
