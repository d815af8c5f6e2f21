//! The three request flows: image to translated image, image to translated
//! markdown, and image to numbered paragraphs with their translations.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::fewshot::FewShot;
use crate::geometry::Position;
use crate::inpaint::Inpainter;
use crate::languages::{Language, has_foreign_letter, is_letter};
use crate::markdown::{align_with_spaces, to_markdown, translate_markdown};
use crate::ocr::{DEFAULT_BAND_HEIGHT, DocumentOcrProvider, OcrProvider, detect_in_bands};
use crate::providers::{ImageData, Provider};
use crate::render::{FontProvider, compose_words, draw_numbered_boxes, layout_lines};
use crate::segmenter::segment;
use crate::segments::{LineSegment, ParagraphSegment, WordSegment};
use crate::storage::{ArtifactStore, request_timestamp, save_best_effort};
use crate::style::unify;
use crate::translate::{Sentence, Translator};

pub const DEFAULT_MASK_PADDING: i32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Pixels added around every line before background removal.
    pub mask_padding: i32,
    pub band_height: i32,
    pub image_bucket: String,
    pub markdown_bucket: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask_padding: DEFAULT_MASK_PADDING,
            band_height: DEFAULT_BAND_HEIGHT,
            image_bucket: "to-image".to_string(),
            markdown_bucket: "to-markdown".to_string(),
        }
    }
}

/// External services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub ocr: Arc<dyn OcrProvider>,
    pub document_ocr: Arc<dyn DocumentOcrProvider>,
    pub inpainter: Arc<dyn Inpainter>,
    pub store: Arc<dyn ArtifactStore>,
    pub fonts: Arc<dyn FontProvider>,
}

/// Numbered paragraph overlay plus the translation of every paragraph.
#[derive(Debug, Clone, Serialize)]
pub struct TextTranslation {
    pub sentences: Vec<Sentence>,
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Translated image plus the words as they were drawn on it.
#[derive(Debug, Clone)]
pub struct ImageTranslation {
    pub words: Vec<WordSegment>,
    pub png: Vec<u8>,
}

pub struct Pipeline<P: Provider + 'static> {
    translator: Translator<P>,
    markdown_provider: P,
    markdown_model: String,
    collaborators: Collaborators,
    config: PipelineConfig,
    examples: Arc<FewShot>,
}

impl<P: Provider + 'static> Pipeline<P> {
    /// `markdown_provider` converts images to markdown; `markdown_model` only
    /// names its artifacts.
    pub fn new(
        translator: Translator<P>,
        markdown_provider: P,
        markdown_model: impl Into<String>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            translator,
            markdown_provider,
            markdown_model: markdown_model.into(),
            collaborators,
            config: PipelineConfig::default(),
            examples: Arc::new(FewShot::default()),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_examples(mut self, examples: Arc<FewShot>) -> Self {
        self.examples = examples;
        self
    }

    /// Translates the text inside the image and draws it back in place.
    pub async fn translate_to_image(&self, bytes: &[u8]) -> Result<ImageTranslation> {
        let image = decode(bytes)?;
        let target = self.translator.target();
        let timestamp = request_timestamp();
        let store = self.collaborators.store.as_ref();
        let bucket = self.config.image_bucket.as_str();
        save_best_effort(store, bucket, &format!("image-{}-{}-before.png", timestamp, target), bytes)
            .await;

        let document = self
            .collaborators
            .document_ocr
            .process_document(bytes)
            .await
            .map_err(|err| Error::collaborator("ocr", err))?;
        let paragraphs = unify(keep_foreign_lines(segment(document.to_word_segments()), target));
        info!(
            "{} paragraph(s) with text to translate into {}",
            paragraphs.len(),
            target
        );

        let (width, height) = image.dimensions();
        let regions: Vec<Position> = paragraphs
            .iter()
            .flat_map(|paragraph| paragraph.lines.iter())
            .filter_map(LineSegment::position)
            .map(|position| {
                position.padded_within(self.config.mask_padding, width as i32, height as i32)
            })
            .collect();

        let inpaint = async {
            self.collaborators
                .inpainter
                .remove_regions(&image, &regions)
                .await
                .map_err(|err| Error::collaborator("inpainter", err))
        };
        let (background, translated) =
            tokio::try_join!(inpaint, self.translator.translate_paragraphs(&paragraphs))?;

        let fonts = self
            .collaborators
            .fonts
            .fonts_for_language(target)
            .map_err(|err| Error::collaborator("fonts", err))?;
        let words = layout_lines(fonts.as_ref(), translated);
        let png = compose_words(&background, &words, fonts.as_ref())
            .map_err(|err| Error::collaborator("compositor", err))?;

        save_best_effort(store, bucket, &format!("image-{}-{}-after.png", timestamp, target), &png)
            .await;
        Ok(ImageTranslation { words, png })
    }

    /// Rebuilds the image as a markdown document, then translates it.
    pub async fn translate_to_markdown(&self, bytes: &[u8]) -> Result<String> {
        let image = decode(bytes)?;
        let target = self.translator.target();
        let timestamp = request_timestamp();
        let store = self.collaborators.store.as_ref();
        let bucket = self.config.markdown_bucket.as_str();
        let prefix = format!("image-{}-{}-{}", timestamp, self.markdown_model, target);
        save_best_effort(store, bucket, &format!("{}-before.png", prefix), bytes).await;

        let annotation = self
            .collaborators
            .ocr
            .detect_text(bytes)
            .await
            .map_err(|err| Error::collaborator("ocr", err))?;
        let paragraphs = segment(annotation.to_word_segments());
        let (width, height) = image.dimensions();
        let aligned = align_with_spaces(width, height, &paragraphs)?;

        let markdown = to_markdown(
            &self.markdown_provider,
            &self.examples,
            self.translator.options().retry,
            &aligned,
            &ImageData::from_bytes(bytes.to_vec()),
        )
        .await?;
        let translated = translate_markdown(self.translator.provider(), &markdown, target).await?;

        save_best_effort(store, bucket, &format!("{}-after.md", prefix), translated.as_bytes())
            .await;
        Ok(translated)
    }

    /// Numbers every paragraph on the image and translates each one whole.
    pub async fn translate_text_from_image(&self, bytes: &[u8]) -> Result<TextTranslation> {
        let image = decode(bytes)?;
        let annotation = detect_in_bands(
            self.collaborators.ocr.clone(),
            &image,
            bytes,
            self.config.band_height,
            self.translator.options().max_concurrency,
        )
        .await?;
        let paragraphs: Vec<ParagraphSegment> = segment(annotation.to_word_segments())
            .into_iter()
            .filter(|paragraph| paragraph.words().any(|word| word.text.chars().any(is_letter)))
            .collect();

        let boxes: Vec<Position> = paragraphs.iter().filter_map(ParagraphSegment::position).collect();
        let png = draw_numbered_boxes(&image, &boxes)
            .map_err(|err| Error::collaborator("compositor", err))?;
        let texts: Vec<String> = paragraphs.iter().map(ParagraphSegment::text).collect();
        let sentences = self.translator.translate_texts(&texts).await?;
        Ok(TextTranslation { sentences, png })
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|err| Error::invalid_input(format!("failed to decode image: {}", err)))
}

/// Keeps lines holding at least one letter outside the target language;
/// paragraphs left without lines are dropped.
fn keep_foreign_lines(
    paragraphs: Vec<ParagraphSegment>,
    target: Language,
) -> Vec<ParagraphSegment> {
    paragraphs
        .into_iter()
        .map(|paragraph| {
            ParagraphSegment::new(
                paragraph
                    .lines
                    .into_iter()
                    .filter(|line| has_foreign_letter(&line.text(), target))
                    .collect(),
            )
        })
        .filter(|paragraph| !paragraph.lines.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inpaint::IdentityInpainter;
    use crate::ocr::{
        Block, Document, DocumentPage, Page, Paragraph, TextAnnotation, Token, TokenStyle, Word,
        rect_vertices,
    };
    use crate::render::{FontSet, encode_png};
    use crate::storage::{FsArtifactStore, NoopStore};
    use crate::style::Rgb;
    use crate::test_util::{FakeProvider, MonospaceFonts, quick_options};
    use anyhow::anyhow;
    use futures_util::FutureExt;
    use futures_util::future::BoxFuture;
    use image::{Rgba, RgbaImage};

    const INK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    const RED: Rgb = Rgb::new(0.8, 0.1, 0.1);
    const BLUE: Rgb = Rgb::new(0.1, 0.1, 0.8);

    struct StaticOcr {
        words: Vec<(&'static str, Position, Rgb)>,
    }

    impl OcrProvider for StaticOcr {
        fn detect_text<'a>(
            &'a self,
            _image: &'a [u8],
        ) -> BoxFuture<'a, anyhow::Result<TextAnnotation>> {
            let paragraphs = self
                .words
                .iter()
                .map(|(text, position, _)| Paragraph {
                    bounding_poly: rect_vertices(position),
                    words: vec![Word {
                        text: text.to_string(),
                        bounding_poly: rect_vertices(position),
                    }],
                })
                .collect();
            let annotation = TextAnnotation {
                pages: vec![Page {
                    width: 100,
                    height: 100,
                    blocks: vec![Block {
                        bounding_poly: Vec::new(),
                        paragraphs,
                    }],
                }],
            };
            async move { Ok(annotation) }.boxed()
        }
    }

    impl DocumentOcrProvider for StaticOcr {
        fn process_document<'a>(
            &'a self,
            _image: &'a [u8],
        ) -> BoxFuture<'a, anyhow::Result<Document>> {
            let tokens = self
                .words
                .iter()
                .map(|(text, position, color)| Token {
                    text: text.to_string(),
                    bounding_poly: rect_vertices(position),
                    style: TokenStyle {
                        pixel_font_size: 18.0,
                        text_color: *color,
                        bold: false,
                        font_weight: 0,
                    },
                })
                .collect();
            async move {
                Ok(Document {
                    pages: vec![DocumentPage { tokens }],
                })
            }
            .boxed()
        }
    }

    struct MissingFonts;

    impl FontProvider for MissingFonts {
        fn fonts_for_language(&self, language: Language) -> anyhow::Result<Arc<dyn FontSet>> {
            Err(anyhow!("no fonts installed for {}", language))
        }
    }

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        encode_png(&DynamicImage::ImageRgba8(image)).unwrap()
    }

    fn blank_png() -> Vec<u8> {
        white_png(100, 100)
    }

    fn collaborators(ocr: StaticOcr, store: Arc<dyn ArtifactStore>) -> Collaborators {
        let ocr = Arc::new(ocr);
        Collaborators {
            ocr: ocr.clone(),
            document_ocr: ocr,
            inpainter: Arc::new(IdentityInpainter),
            store,
            fonts: Arc::new(MissingFonts),
        }
    }

    fn menu_ocr() -> StaticOcr {
        StaticOcr {
            words: vec![
                ("메뉴", Position::new(10, 10, 30, 50), INK),
                ("커피", Position::new(60, 10, 80, 50), INK),
                ("2,000", Position::new(60, 80, 80, 95), INK),
            ],
        }
    }

    /// Three one-line paragraphs; the two words of a line differ in color
    /// so they stay separate words.
    fn cafe_ocr() -> StaticOcr {
        StaticOcr {
            words: vec![
                ("아이스", Position::new(10, 10, 30, 60), RED),
                ("커피", Position::new(10, 70, 30, 110), BLUE),
                ("따뜻한", Position::new(50, 10, 70, 60), RED),
                ("라떼", Position::new(50, 70, 70, 110), BLUE),
                ("녹차", Position::new(90, 10, 110, 50), INK),
            ],
        }
    }

    fn cafe_word(text: &str) -> String {
        match text {
            "아이스" => "Iced",
            "커피" => "coffee",
            "따뜻한" => "Hot",
            "라떼" => "latte",
            "녹차" => "Green tea",
            other => other,
        }
        .to_string()
    }

    fn line(text: &str, top: i32) -> LineSegment {
        LineSegment::new(vec![WordSegment::new(text, Position::new(top, 0, top + 10, 50))])
    }

    #[test]
    fn target_language_lines_are_dropped() {
        let paragraphs = vec![
            ParagraphSegment::new(vec![line("Hello", 0), line("안녕", 20)]),
            ParagraphSegment::new(vec![line("World", 40)]),
            ParagraphSegment::new(vec![line("123", 60)]),
        ];
        let kept = keep_foreign_lines(paragraphs, Language::EnUs);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].text(), "안녕");
    }

    #[test]
    fn undecodable_bytes_are_invalid_input() {
        assert!(matches!(decode(b"not an image"), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn sentences_are_numbered_and_translated() {
        let provider = FakeProvider::scripted(vec![r#"{"0": "Menu", "1": "Coffee 2,000"}"#]);
        let translator = Translator::new(provider.clone(), Language::EnUs, quick_options());
        let pipeline = Pipeline::new(
            translator,
            FakeProvider::scripted(Vec::<&str>::new()),
            "fake-model",
            collaborators(menu_ocr(), Arc::new(NoopStore)),
        );
        let result = pipeline.translate_text_from_image(&blank_png()).await.unwrap();
        assert_eq!(result.sentences.len(), 2);
        assert_eq!(result.sentences[0].text, "메뉴");
        assert_eq!(result.sentences[1].text, "커피 2,000");
        assert_eq!(result.sentences[1].translated_text, "Coffee 2,000");
        assert!(image::load_from_memory(&result.png).is_ok());
        assert_eq!(
            provider.requests()[0][1],
            r#"{"0":"메뉴","1":"커피 2,000"}"#
        );
    }

    #[tokio::test]
    async fn markdown_flow_saves_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Translator::new(
            FakeProvider::scripted(vec!["# Menu"]),
            Language::EnUs,
            quick_options(),
        );
        let markdown = FakeProvider::scripted(vec!["```markdown\n# 메뉴\n```"]);
        let pipeline = Pipeline::new(
            translator,
            markdown.clone(),
            "fake-model",
            collaborators(menu_ocr(), Arc::new(FsArtifactStore::new(dir.path()))),
        );
        let translated = pipeline.translate_to_markdown(&blank_png()).await.unwrap();
        assert_eq!(translated, "# Menu");
        assert_eq!(markdown.calls(), 1);

        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("to-markdown"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("-fake-model-en-US-after.md"));
        assert!(names[1].ends_with("-fake-model-en-US-before.png"));
    }

    #[tokio::test]
    async fn image_flow_reports_the_failing_collaborator() {
        let provider = FakeProvider::word_by_word(|text| format!("<{}>", text));
        let translator = Translator::new(provider.clone(), Language::EnUs, quick_options());
        let pipeline = Pipeline::new(
            translator,
            FakeProvider::scripted(Vec::<&str>::new()),
            "fake-model",
            collaborators(menu_ocr(), Arc::new(NoopStore)),
        );
        let err = pipeline.translate_to_image(&blank_png()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::CollaboratorFailure {
                collaborator: "fonts",
                ..
            }
        ));
        // both foreign lines were translated before fonts were needed
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn one_line_paragraphs_keep_their_order_and_positions() {
        let document = cafe_ocr().process_document(&[]).await.unwrap();
        let paragraphs = unify(keep_foreign_lines(
            segment(document.to_word_segments()),
            Language::EnUs,
        ));
        assert_eq!(paragraphs.len(), 3);
        assert!(paragraphs.iter().all(|paragraph| paragraph.lines.len() == 1));

        let provider = FakeProvider::word_by_word(cafe_word);
        let translator = Translator::new(provider.clone(), Language::EnUs, quick_options());
        let translated = translator.translate_paragraphs(&paragraphs).await.unwrap();

        // no multi-line paragraph, so no grouping call; two batches of lines
        assert_eq!(provider.calls(), 2);
        let placed: Vec<Vec<(&str, Position)>> = translated
            .iter()
            .map(|line| {
                line.words
                    .iter()
                    .map(|word| (word.text.as_str(), word.position))
                    .collect()
            })
            .collect();
        assert_eq!(
            placed,
            vec![
                vec![
                    ("coffee", Position::new(10, 70, 30, 110)),
                    ("Iced", Position::new(10, 10, 30, 60)),
                ],
                vec![
                    ("latte", Position::new(50, 70, 70, 110)),
                    ("Hot", Position::new(50, 10, 70, 60)),
                ],
                vec![("Green tea", Position::new(90, 10, 110, 50))],
            ]
        );
        assert_eq!(
            translated[0].slots,
            vec![Position::new(10, 10, 30, 60), Position::new(10, 70, 30, 110)]
        );
        assert_eq!(translated[0].words[0].style.map(|style| style.text_color), Some(BLUE));
    }

    #[tokio::test]
    async fn image_flow_draws_fitted_words_and_saves_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Translator::new(
            FakeProvider::word_by_word(cafe_word),
            Language::EnUs,
            quick_options(),
        );
        let mut collaborators =
            collaborators(cafe_ocr(), Arc::new(FsArtifactStore::new(dir.path())));
        collaborators.fonts = Arc::new(MonospaceFonts);
        let pipeline = Pipeline::new(
            translator,
            FakeProvider::scripted(Vec::<&str>::new()),
            "fake-model",
            collaborators,
        );
        let result = pipeline.translate_to_image(&white_png(120, 120)).await.unwrap();

        let drawn = image::load_from_memory(&result.png).unwrap();
        assert_eq!(drawn.dimensions(), (120, 120));
        assert!(!result.words.is_empty());
        for word in &result.words {
            let size = word.font_size.unwrap();
            assert!(size <= 18.0, "{} drawn at {}", word.text, size);
        }
        // "coffee Iced" at 0.6 × size per char has 100 px of row
        assert_eq!(result.words[0].text, "coffee ");
        assert_eq!(result.words[0].font_size, Some(15.0));

        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("to-image"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("-en-US-after.png"));
        assert!(names[1].ends_with("-en-US-before.png"));
        let saved = std::fs::read(dir.path().join("to-image").join(&names[0])).unwrap();
        assert_eq!(saved, result.png);
    }
}
