use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use layout_translator::geometry::{Position, Vertex};
use layout_translator::ocr::{
    Block, OcrProvider, Page, Paragraph, TextAnnotation, Word, detect_in_bands,
};
use layout_translator::providers::{ImageData, Provider, ProviderFuture, ProviderResponse};
use layout_translator::render::encode_png;
use layout_translator::segments::{LineSegment, WordSegment};
use layout_translator::translate::{IdText, RetryPolicy};
use layout_translator::{Error, Language, TranslationOptions, Translator};

type Reply = dyn Fn(&str) -> String + Send + Sync;

/// Answers every request from its last message and records that message.
#[derive(Clone)]
struct EchoProvider {
    last: Option<String>,
    reply: Arc<Reply>,
    calls: Arc<AtomicUsize>,
    payloads: Arc<Mutex<Vec<String>>>,
}

impl EchoProvider {
    fn new(reply: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            last: None,
            reply: Arc::new(reply),
            calls: Arc::new(AtomicUsize::new(0)),
            payloads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for EchoProvider {
    fn append_system_input(self, _input: String) -> Self {
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.last = Some(input);
        self
    }

    fn append_assistant_input(self, _input: String) -> Self {
        self
    }

    fn append_user_image(self, _data: ImageData) -> Self {
        self
    }

    fn complete(self) -> ProviderFuture {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let payload = self.last.clone().unwrap_or_default();
            self.payloads.lock().unwrap().push(payload.clone());
            Ok(ProviderResponse {
                text: (self.reply)(&payload),
                model: None,
                usage: None,
            })
        })
    }
}

fn options() -> TranslationOptions {
    TranslationOptions {
        batch_lines: 2,
        retry: RetryPolicy {
            max_retries: 4,
            backoff: Duration::from_millis(1),
        },
        max_concurrency: 2,
    }
}

fn menu_lines() -> Vec<LineSegment> {
    vec![
        LineSegment::new(vec![
            WordSegment::new("아이스", Position::new(0, 0, 20, 60)),
            WordSegment::new("아메리카노", Position::new(0, 70, 20, 170)),
        ]),
        LineSegment::new(vec![WordSegment::new("라떼", Position::new(30, 0, 50, 40))]),
    ]
}

fn translate_word(text: &str) -> &'static str {
    match text {
        "아이스" => "Iced",
        "아메리카노" => "Americano",
        "라떼" => "Latte",
        _ => "?",
    }
}

#[tokio::test]
async fn reordered_words_keep_their_source_positions() {
    let provider = EchoProvider::new(|payload| {
        let sent: Vec<Vec<IdText>> = serde_json::from_str(payload).unwrap();
        let reply: Vec<Vec<IdText>> = sent
            .into_iter()
            .map(|line| {
                line.into_iter()
                    .rev()
                    .map(|word| IdText {
                        id: word.id,
                        text: translate_word(&word.text).to_string(),
                    })
                    .collect()
            })
            .collect();
        serde_json::to_string(&reply).unwrap()
    });
    let translator = Translator::new(provider.clone(), Language::EnUs, options());
    let translated = translator.translate_lines(menu_lines()).await.unwrap();

    assert_eq!(provider.calls(), 1);
    let first: Vec<(&str, i32)> = translated[0]
        .words
        .iter()
        .map(|word| (word.text.as_str(), word.position.left))
        .collect();
    assert_eq!(first, vec![("Americano", 70), ("Iced", 0)]);
    assert_eq!(translated[0].slots.len(), 2);
    assert_eq!(translated[1].words[0].text, "Latte");
    assert_eq!(translated[1].words[0].position.top, 30);

    let payloads = provider.payloads.lock().unwrap().clone();
    insta::assert_snapshot!(
        payloads[0],
        @r#"[[{"id":1,"text":"아이스"},{"id":2,"text":"아메리카노"}],[{"id":3,"text":"라떼"}]]"#
    );
}

#[tokio::test]
async fn dropped_ids_exhaust_the_retry_budget() {
    let provider = EchoProvider::new(|_| r#"[[{"id":1,"text":"Iced"}],[{"id":3,"text":"Latte"}]]"#.to_string());
    let translator = Translator::new(provider.clone(), Language::EnUs, options());
    let err = translator.translate_lines(menu_lines()).await.unwrap_err();

    assert_eq!(provider.calls(), 5);
    match err {
        Error::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 5);
            assert!(matches!(*last, Error::SchemaViolation(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn rect(position: Position) -> Vec<Vertex> {
    vec![
        Vertex::new(position.left, position.top),
        Vertex::new(position.right, position.top),
        Vertex::new(position.right, position.bottom),
        Vertex::new(position.left, position.bottom),
    ]
}

fn annotation(words: &[(&str, Position)]) -> TextAnnotation {
    let paragraphs = words
        .iter()
        .map(|(text, position)| Paragraph {
            bounding_poly: rect(*position),
            words: vec![Word {
                text: text.to_string(),
                bounding_poly: rect(*position),
            }],
        })
        .collect();
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

/// Reports words in the coordinates of whatever band it is handed.
struct BandAwareOcr {
    calls: AtomicUsize,
}

impl OcrProvider for BandAwareOcr {
    fn detect_text<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, anyhow::Result<TextAnnotation>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let height = image::load_from_memory(image)?.dimensions().1;
            Ok(match height {
                400 => annotation(&[
                    ("top", Position::new(120, 10, 150, 60)),
                    ("bottom", Position::new(370, 10, 390, 60)),
                ]),
                150 => annotation(&[("top", Position::new(120, 10, 150, 60))]),
                _ => annotation(&[("bottom", Position::new(220, 10, 240, 60))]),
            })
        }
        .boxed()
    }
}

#[tokio::test]
async fn band_results_are_shifted_back_into_image_coordinates() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 400, Rgba([255; 4])));
    let bytes = encode_png(&image).unwrap();
    let ocr = Arc::new(BandAwareOcr {
        calls: AtomicUsize::new(0),
    });
    let result = detect_in_bands(ocr.clone(), &image, &bytes, 200, 2).await.unwrap();

    assert_eq!(ocr.calls.load(Ordering::SeqCst), 3);
    let words = result.to_word_segments();
    let found: Vec<(&str, i32)> = words
        .iter()
        .map(|word| (word.text.as_str(), word.position.top))
        .collect();
    assert_eq!(found, vec![("top", 120), ("bottom", 370)]);
}
