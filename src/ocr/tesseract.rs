use anyhow::{Context, Result, anyhow};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::io::Write;
use std::process::Command;
use tracing::{debug, warn};

use crate::languages::Language;

use super::hocr::{HocrPage, parse_hocr, to_annotation};
use super::{OcrProvider, TextAnnotation};

/// Fully automatic page segmentation.
const DEFAULT_PSM: u32 = 3;

/// Word detection through the `tesseract` CLI and its hOCR output.
#[derive(Debug, Clone)]
pub struct Tesseract {
    languages: String,
    psm: u32,
}

impl Tesseract {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
            psm: DEFAULT_PSM,
        }
    }

    /// Keeps only the requested languages tesseract has traineddata for.
    pub fn with_available_languages(requested: &str) -> Result<Self> {
        Ok(Self::new(normalize_ocr_languages(requested)?))
    }

    /// Every supported script, with the target's own code last.
    pub fn for_target(target: Language) -> Result<Self> {
        Self::with_available_languages(&target_languages(target))
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    /// Runs tesseract on a blocking thread and parses its hOCR.
    pub(crate) async fn recognize(&self, image: &[u8]) -> Result<Vec<HocrPage>> {
        let image = image.to_vec();
        let languages = self.languages.clone();
        let psm = self.psm;
        let hocr = tokio::task::spawn_blocking(move || run_hocr(&image, &languages, psm))
            .await
            .with_context(|| "tesseract task panicked")??;
        let pages = parse_hocr(&hocr);
        debug!(
            "tesseract: {} page(s), {} word(s)",
            pages.len(),
            pages
                .iter()
                .flat_map(|page| page.blocks.iter())
                .flat_map(|block| block.paragraphs.iter())
                .flat_map(|paragraph| paragraph.lines.iter())
                .map(|line| line.words.len())
                .sum::<usize>()
        );
        Ok(pages)
    }
}

impl OcrProvider for Tesseract {
    fn detect_text<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<TextAnnotation>> {
        async move {
            let pages = self.recognize(image).await?;
            Ok(to_annotation(&pages))
        }
        .boxed()
    }
}

fn tesseract_code(language: Language) -> &'static str {
    match language {
        Language::EnUs => "eng",
        Language::KoKr => "kor",
        Language::JaJp => "jpn",
    }
}

/// Source text may be in any supported language; target-language lines are
/// still detected so they can be told apart later.
fn target_languages(target: Language) -> String {
    [Language::KoKr, Language::JaJp, Language::EnUs]
        .into_iter()
        .filter(|language| *language != target)
        .chain(std::iter::once(target))
        .map(tesseract_code)
        .collect::<Vec<_>>()
        .join("+")
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(err) => {
            debug!("cannot list tesseract languages: {err:#}");
            return Ok(trimmed.to_string());
        }
    };
    select_languages(trimmed, &available)
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let (chosen, missing): (Vec<&str>, Vec<&str>) = requested
        .split(['+', ',', ' '])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .partition(|lang| available.iter().any(|value| value.as_str() == *lang));
    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

fn run_hocr(image: &[u8], languages: &str, psm: u32) -> Result<String> {
    let decoded =
        image::load_from_memory(image).with_context(|| "failed to decode image for OCR")?;
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    decoded
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush().ok();

    let output = Command::new("tesseract")
        .arg(tmp.path())
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("hocr")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn keeps_available_languages() {
        let available = langs(&["eng", "jpn", "osd"]);
        assert_eq!(
            select_languages("eng+kor, jpn", &available).expect("select"),
            "eng+jpn"
        );
    }

    #[test]
    fn rejects_when_nothing_is_available() {
        let err = select_languages("kor", &langs(&["eng"])).expect_err("must fail");
        assert!(err.to_string().contains("kor"));
    }

    #[test]
    fn target_language_is_recognized_last() {
        assert_eq!(target_languages(Language::EnUs), "kor+jpn+eng");
        assert_eq!(target_languages(Language::KoKr), "jpn+eng+kor");
        assert_eq!(target_languages(Language::JaJp), "kor+eng+jpn");
        assert_eq!(Tesseract::new("eng").psm, DEFAULT_PSM);
    }
}
