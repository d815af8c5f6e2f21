//! Concurrent, retry-safe translation of segmented lines.
//!
//! Lines are cut into small batches; each batch is tagged with word ids,
//! sent on its own task, validated against the ids it was sent with and
//! re-attached to the source words by id. Any batch that keeps failing
//! validation fails the whole request.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::anyhow;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fewshot::FewShot;
use crate::languages::Language;
use crate::providers::Provider;
use crate::segments::{LineSegment, ParagraphSegment, flatten_lines};

mod batch;
mod grouping;
pub mod prompts;
mod retry;

pub use batch::{IdText, TranslatedLine, parse_reply, reattach, tag_batch, validate};
pub use grouping::{GroupingRequest, extract_json, parse_groups, validate_ids};
pub use prompts::{PromptKind, render_system_prompt};
pub use retry::RetryPolicy;

pub const DEFAULT_BATCH_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationOptions {
    /// Lines per batch.
    pub batch_lines: usize,
    pub retry: RetryPolicy,
    /// Outstanding completion calls.
    pub max_concurrency: usize,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            batch_lines: DEFAULT_BATCH_LINES,
            retry: RetryPolicy::default(),
            max_concurrency: num_cpus::get() * 2,
        }
    }
}

/// Source text with its translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sentence {
    pub text: String,
    pub translated_text: String,
}

pub struct Translator<P: Provider + 'static> {
    provider: P,
    target: Language,
    options: TranslationOptions,
    examples: Arc<FewShot>,
}

impl<P: Provider + 'static> Translator<P> {
    pub fn new(provider: P, target: Language, options: TranslationOptions) -> Self {
        Self {
            provider,
            target,
            options,
            examples: Arc::new(FewShot::default()),
        }
    }

    pub fn with_examples(mut self, examples: Arc<FewShot>) -> Self {
        self.examples = examples;
        self
    }

    pub fn target(&self) -> Language {
        self.target
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn options(&self) -> &TranslationOptions {
        &self.options
    }

    /// Groups, then translates, every line of `paragraphs`.
    pub async fn translate_paragraphs(
        &self,
        paragraphs: &[ParagraphSegment],
    ) -> Result<Vec<TranslatedLine>> {
        let lines = self.group_lines(paragraphs).await?;
        self.translate_lines(lines).await
    }

    /// Re-groups the lines of multi-line paragraphs into sentences.
    pub async fn group_lines(&self, paragraphs: &[ParagraphSegment]) -> Result<Vec<LineSegment>> {
        let Some(request) = GroupingRequest::build(paragraphs) else {
            debug!("no multi-line paragraph; grouping skipped");
            return Ok(flatten_lines(paragraphs.to_vec()));
        };
        let system = system_prompt(PromptKind::GroupLines, self.target)?;
        let payload = request.prompt_value()?;
        let count = request.candidates.len();
        let groups = self
            .options
            .retry
            .run("grouping", |_| {
                let provider = self
                    .provider
                    .clone()
                    .append_system_input(system.clone())
                    .append_user_input(self.examples.grouping.input.clone())
                    .append_assistant_input(self.examples.grouping.output.clone())
                    .append_user_input(payload.clone());
                async move {
                    let response = provider
                        .complete()
                        .await
                        .map_err(|err| Error::collaborator("provider", err))?;
                    let groups = parse_groups(&response.text)?;
                    validate_ids(&groups, count)?;
                    Ok(groups)
                }
            })
            .await?;
        request.assemble(&groups)
    }

    /// Translates lines in concurrent batches; output follows input order.
    pub async fn translate_lines(&self, lines: Vec<LineSegment>) -> Result<Vec<TranslatedLine>> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let system = system_prompt(PromptKind::TranslateLines, self.target)?;
        let batches: Vec<Vec<LineSegment>> = lines
            .chunks(self.options.batch_lines.max(1))
            .map(<[LineSegment]>::to_vec)
            .collect();
        info!(
            "translating {} line(s) in {} batch(es) into {}",
            lines.len(),
            batches.len(),
            self.target
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        let total = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            let provider = self.provider.clone();
            let system = system.clone();
            let retry = self.options.retry;
            let semaphore = semaphore.clone();
            set.spawn(async move {
                debug!("batch {}/{} pending", index + 1, total);
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|err| Error::collaborator("translator", anyhow!(err)))?;
                let label = format!("batch {}/{}", index + 1, total);
                let lines = batch.as_slice();
                let translated = retry
                    .run(&label, move |_| {
                        translate_batch(provider.clone(), system.clone(), lines)
                    })
                    .await?;
                Ok::<_, Error>((index, translated))
            });
        }

        let mut slots: Vec<Option<Vec<TranslatedLine>>> = vec![None; total];
        while let Some(joined) = set.join_next().await {
            let (index, translated) =
                joined.map_err(|err| Error::collaborator("translator", anyhow!(err)))??;
            slots[index] = Some(translated);
        }
        Ok(slots.into_iter().flatten().flatten().collect())
    }

    /// Translates whole paragraph texts as one JSON object keyed by index.
    pub async fn translate_texts(&self, texts: &[String]) -> Result<Vec<Sentence>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let sent: BTreeMap<String, &str> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| (index.to_string(), text.as_str()))
            .collect();
        let payload = serde_json::to_string(&sent)
            .map_err(|err| Error::invalid_input(format!("failed to encode texts: {}", err)))?;
        let system = system_prompt(PromptKind::TranslateSentences, self.target)?;
        let keys: BTreeSet<String> = sent.keys().cloned().collect();

        let mut translated = self
            .options
            .retry
            .run("sentences", |_| {
                let provider = self
                    .provider
                    .clone()
                    .append_system_input(system.clone())
                    .append_user_input(payload.clone());
                let keys = &keys;
                async move {
                    let response = provider
                        .complete()
                        .await
                        .map_err(|err| Error::collaborator("provider", err))?;
                    parse_sentence_map(&response.text, keys)
                }
            })
            .await?;

        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let translated_text = translated
                    .remove(&index.to_string())
                    .ok_or_else(|| Error::schema(format!("missing key {}", index)))?;
                Ok(Sentence {
                    text: text.clone(),
                    translated_text,
                })
            })
            .collect()
    }
}

async fn translate_batch<P: Provider>(
    provider: P,
    system: String,
    lines: &[LineSegment],
) -> Result<Vec<TranslatedLine>> {
    let sent = tag_batch(lines);
    let payload = serde_json::to_string(&sent)
        .map_err(|err| Error::invalid_input(format!("failed to encode batch: {}", err)))?;
    let response = provider
        .append_system_input(system)
        .append_user_input(payload)
        .complete()
        .await
        .map_err(|err| Error::collaborator("provider", err))?;
    let received = parse_reply(&response.text)?;
    validate(&sent, &received)?;
    reattach(lines, received)
}

fn parse_sentence_map(reply: &str, keys: &BTreeSet<String>) -> Result<BTreeMap<String, String>> {
    let body = extract_json(reply).unwrap_or(reply.trim());
    let map: BTreeMap<String, String> = serde_json::from_str(body)
        .map_err(|err| Error::schema(format!("unparsable sentence reply: {}", err)))?;
    if map.len() != keys.len() || !map.keys().all(|key| keys.contains(key)) {
        return Err(Error::schema(format!(
            "expected keys {:?}, got {:?}",
            keys,
            map.keys().collect::<Vec<_>>()
        )));
    }
    Ok(map)
}

fn system_prompt(kind: PromptKind, target: Language) -> Result<String> {
    render_system_prompt(kind, target).map_err(|err| Error::collaborator("prompt", err))
}
