use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::DEFAULT_BAND_HEIGHT;
use crate::pipeline::{DEFAULT_MASK_PADDING, PipelineConfig};
use crate::translate::{DEFAULT_BATCH_LINES, RetryPolicy, TranslationOptions};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub batch_lines: usize,
    pub max_retries: usize,
    pub backoff_ms: u64,
    /// `None` sizes the pool from the CPU count.
    pub max_concurrency: Option<usize>,
    /// Tesseract language list such as `kor+eng`. When unset every supported
    /// language is used, the target's last.
    pub ocr_languages: Option<String>,
    pub band_height: i32,
    pub mask_padding: i32,
    pub font_dir: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
    pub image_bucket: String,
    pub markdown_bucket: String,
    pub examples: ExampleSettings,
}

/// Few-shot example files replacing the built-in ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExampleSettings {
    pub grouping_input: Option<PathBuf>,
    pub grouping_output: Option<PathBuf>,
    pub markdown_input: Option<PathBuf>,
    pub markdown_output: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        let retry = RetryPolicy::default();
        Self {
            batch_lines: DEFAULT_BATCH_LINES,
            max_retries: retry.max_retries,
            backoff_ms: retry.backoff.as_millis() as u64,
            max_concurrency: None,
            ocr_languages: None,
            band_height: DEFAULT_BAND_HEIGHT,
            mask_padding: DEFAULT_MASK_PADDING,
            font_dir: None,
            storage_dir: None,
            image_bucket: pipeline.image_bucket,
            markdown_bucket: pipeline.markdown_bucket,
            examples: ExampleSettings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    ocr: Option<OcrSettings>,
    render: Option<RenderSettings>,
    storage: Option<StorageSettings>,
    examples: Option<ExampleSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    batch_lines: Option<usize>,
    max_retries: Option<usize>,
    backoff_ms: Option<u64>,
    max_concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    band_height: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    mask_padding: Option<i32>,
    font_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSettings {
    dir: Option<PathBuf>,
    image_bucket: Option<String>,
    markdown_bucket: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn translation_options(&self) -> TranslationOptions {
        let defaults = TranslationOptions::default();
        TranslationOptions {
            batch_lines: self.batch_lines,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                backoff: Duration::from_millis(self.backoff_ms),
            },
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            mask_padding: self.mask_padding,
            band_height: self.band_height,
            image_bucket: self.image_bucket.clone(),
            markdown_bucket: self.markdown_bucket.clone(),
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translation) = incoming.translation {
            if let Some(lines) = translation.batch_lines
                && lines > 0
            {
                self.batch_lines = lines;
            }
            if let Some(retries) = translation.max_retries {
                self.max_retries = retries;
            }
            if let Some(backoff) = translation.backoff_ms {
                self.backoff_ms = backoff;
            }
            if let Some(limit) = translation.max_concurrency
                && limit > 0
            {
                self.max_concurrency = Some(limit);
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages
                && !languages.trim().is_empty()
            {
                self.ocr_languages = Some(languages);
            }
            if let Some(height) = ocr.band_height
                && height > 0
            {
                self.band_height = height;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(padding) = render.mask_padding
                && padding >= 0
            {
                self.mask_padding = padding;
            }
            if let Some(dir) = render.font_dir {
                self.font_dir = Some(dir);
            }
        }
        if let Some(storage) = incoming.storage {
            if let Some(dir) = storage.dir {
                self.storage_dir = Some(dir);
            }
            if let Some(bucket) = storage.image_bucket
                && !bucket.trim().is_empty()
            {
                self.image_bucket = bucket;
            }
            if let Some(bucket) = storage.markdown_bucket
                && !bucket.trim().is_empty()
            {
                self.markdown_bucket = bucket;
            }
        }
        if let Some(examples) = incoming.examples {
            let current = &mut self.examples;
            current.grouping_input = examples.grouping_input.or(current.grouping_input.take());
            current.grouping_output = examples.grouping_output.or(current.grouping_output.take());
            current.markdown_input = examples.markdown_input.or(current.markdown_input.take());
            current.markdown_output = examples.markdown_output.or(current.markdown_output.take());
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".layout-translator"))
        }
    })
}
