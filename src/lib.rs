use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub mod error;
pub mod fewshot;
pub mod geometry;
pub mod inpaint;
pub mod languages;
pub mod logging;
pub mod markdown;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod render;
pub mod segmenter;
pub mod segments;
pub mod settings;
pub mod storage;
pub mod style;
pub mod translate;

#[cfg(test)]
mod test_util;

pub use error::Error;
pub use languages::Language;
pub use pipeline::{Collaborators, ImageTranslation, Pipeline, PipelineConfig, TextTranslation};
pub use providers::{Provider, ProviderKind};
pub use translate::{Sentence, TranslationOptions, Translator};

use inpaint::{FlatFillInpainter, IdentityInpainter, Inpainter};
use ocr::{Tesseract, TesseractDocument};
use render::{DirectoryFontProvider, FontProvider, SystemFontProvider};
use storage::{ArtifactStore, FsArtifactStore, NoopStore};

/// Languages tesseract looks for when settings name none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Translated text drawn back onto the image.
    Image,
    /// The image rebuilt as a translated markdown document.
    Markdown,
    /// Numbered paragraphs with their translations.
    Sentences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InpaintMode {
    None,
    Fill,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub lang: String,
    pub model: Option<String>,
    pub markdown_model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub inpaint: InpaintMode,
    pub font_dir: Option<String>,
}

#[derive(Debug)]
pub enum Output {
    Image(Vec<u8>),
    Markdown(String),
    Sentences(TextTranslation),
}

pub async fn run(config: Config, image: Vec<u8>) -> Result<Output> {
    if image.is_empty() {
        return Err(Error::invalid_input("image is empty").into());
    }
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let target = Language::parse(&config.lang)?;

    let selection =
        providers::resolve_provider_selection(config.model.as_deref(), config.key.as_deref())?;
    let key = providers::resolve_key(selection.provider, config.key.as_deref())
        .with_context(|| "no API key found for selected provider")?;
    let model = selection.model();
    let provider = providers::build_provider(selection.provider, key.clone(), model.clone());

    let (markdown_provider, markdown_model) = match config.markdown_model.as_deref() {
        Some(arg) => {
            let markdown_selection = providers::resolve_provider_selection(Some(arg), None)?;
            let markdown_key = if selection.provider == markdown_selection.provider {
                key.clone()
            } else {
                providers::resolve_key(markdown_selection.provider, None)?
            };
            let model = markdown_selection.model();
            let provider =
                providers::build_provider(markdown_selection.provider, markdown_key, model.clone());
            (provider, model)
        }
        None => (provider.clone(), model.clone()),
    };
    info!(
        "mode {:?}, target {}, model {}:{}",
        config.mode,
        target,
        selection.provider.as_str(),
        model
    );

    let examples = Arc::new(fewshot::FewShot::load(&settings.examples)?);
    let translator = Translator::new(provider, target, settings.translation_options())
        .with_examples(examples.clone());
    let pipeline = Pipeline::new(
        translator,
        markdown_provider,
        markdown_model,
        collaborators(&config, &settings, target)?,
    )
    .with_config(settings.pipeline_config())
    .with_examples(examples);

    let output = match config.mode {
        Mode::Image => Output::Image(pipeline.translate_to_image(&image).await?.png),
        Mode::Markdown => Output::Markdown(pipeline.translate_to_markdown(&image).await?),
        Mode::Sentences => Output::Sentences(pipeline.translate_text_from_image(&image).await?),
    };
    Ok(output)
}

fn collaborators(
    config: &Config,
    settings: &settings::Settings,
    target: Language,
) -> Result<Collaborators> {
    let tesseract = match settings.ocr_languages.as_deref() {
        Some(languages) => Tesseract::with_available_languages(languages)?,
        None => Tesseract::for_target(target)?,
    };
    info!("ocr languages: {}", tesseract.languages());

    let inpainter: Arc<dyn Inpainter> = match config.inpaint {
        InpaintMode::None => Arc::new(IdentityInpainter),
        InpaintMode::Fill => Arc::new(FlatFillInpainter),
    };
    let store: Arc<dyn ArtifactStore> = match settings.storage_dir.as_ref() {
        Some(dir) => Arc::new(FsArtifactStore::new(dir)),
        None => Arc::new(NoopStore),
    };
    let font_dir = config
        .font_dir
        .as_deref()
        .map(PathBuf::from)
        .or_else(|| settings.font_dir.clone());
    let fonts: Arc<dyn FontProvider> = match font_dir {
        Some(dir) => Arc::new(DirectoryFontProvider::new(dir)),
        None => Arc::new(SystemFontProvider::new()),
    };

    Ok(Collaborators {
        ocr: Arc::new(tesseract.clone()),
        document_ocr: Arc::new(TesseractDocument::new(tesseract)),
        inpainter,
        store,
        fonts,
    })
}

/// Sentences as `n<TAB>source<TAB>translation` lines, numbered like the boxes.
pub fn format_sentences(sentences: &[Sentence]) -> String {
    sentences
        .iter()
        .enumerate()
        .map(|(index, sentence)| {
            format!(
                "{}\t{}\t{}",
                index + 1,
                sentence.text.replace('\n', " "),
                sentence.translated_text.replace('\n', " ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_are_numbered_from_one() {
        let sentences = vec![
            Sentence {
                text: "메뉴".to_string(),
                translated_text: "Menu".to_string(),
            },
            Sentence {
                text: "커피\n2,000".to_string(),
                translated_text: "Coffee\n2,000".to_string(),
            },
        ];
        assert_eq!(
            format_sentences(&sentences),
            "1\t메뉴\tMenu\n2\t커피 2,000\tCoffee 2,000"
        );
    }

    #[tokio::test]
    async fn empty_image_is_rejected_before_any_setup() {
        let config = Config {
            mode: Mode::Image,
            lang: "en-US".to_string(),
            model: None,
            markdown_model: None,
            key: None,
            settings_path: None,
            inpaint: InpaintMode::None,
            font_dir: None,
        };
        let err = run(config, Vec::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidInput(_))
        ));
    }
}
