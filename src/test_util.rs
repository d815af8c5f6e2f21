use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;

use crate::providers::{ImageData, Provider, ProviderFuture, ProviderResponse};
use crate::languages::Language;
use crate::render::{FontProvider, FontSet, TextMeasurer};
use crate::translate::{IdText, RetryPolicy, TranslationOptions};

type Reply = dyn Fn(&[String]) -> anyhow::Result<String> + Send + Sync;

/// In-memory completion provider. Every request is recorded as the list of
/// message texts it carried, images as `<image>`.
#[derive(Clone)]
pub(crate) struct FakeProvider {
    transcript: Vec<String>,
    reply: Arc<Reply>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeProvider {
    pub(crate) fn from_fn<F>(reply: F) -> Self
    where
        F: Fn(&[String]) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            transcript: Vec::new(),
            reply: Arc::new(reply),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replies in order; running out is a provider error.
    pub(crate) fn scripted<S: Into<String>>(replies: Vec<S>) -> Self {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(replies.into_iter().map(Into::into).collect());
        Self::from_fn(move |_| {
            queue
                .lock()
                .map_err(|_| anyhow!("script lock poisoned"))?
                .pop_front()
                .ok_or_else(|| anyhow!("no scripted reply left"))
        })
    }

    /// Answers line batches by mapping every word and reversing each line.
    pub(crate) fn word_by_word(map: fn(&str) -> String) -> Self {
        Self::from_fn(move |messages| {
            let request = messages.last().ok_or_else(|| anyhow!("empty request"))?;
            let lines: Vec<Vec<IdText>> = serde_json::from_str(request)?;
            let reply: Vec<Vec<IdText>> = lines
                .into_iter()
                .map(|line| {
                    line.into_iter()
                        .rev()
                        .map(|word| IdText {
                            id: word.id,
                            text: map(&word.text),
                        })
                        .collect()
                })
                .collect();
            Ok(serde_json::to_string(&reply)?)
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn push(mut self, text: String) -> Self {
        self.transcript.push(text);
        self
    }
}

impl Provider for FakeProvider {
    fn append_system_input(self, input: String) -> Self {
        self.push(input)
    }

    fn append_user_input(self, input: String) -> Self {
        self.push(input)
    }

    fn append_assistant_input(self, input: String) -> Self {
        self.push(input)
    }

    fn append_user_image(self, _data: ImageData) -> Self {
        self.push("<image>".to_string())
    }

    fn complete(self) -> ProviderFuture {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(self.transcript.clone());
            }
            let text = (self.reply)(&self.transcript)?;
            Ok(ProviderResponse {
                text,
                model: Some("fake".to_string()),
                usage: None,
            })
        })
    }
}

pub(crate) fn quick_options() -> TranslationOptions {
    TranslationOptions {
        batch_lines: 2,
        retry: RetryPolicy {
            max_retries: 4,
            backoff: Duration::from_millis(1),
        },
        max_concurrency: 4,
    }
}

/// Every character is `0.6 × size` wide and the line is `1.2 × size` tall.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MonospaceMeasurer;

impl TextMeasurer for MonospaceMeasurer {
    fn measure(&self, text: &str, size: f64, _font_weight: u32) -> (f64, f64) {
        let chars = text.chars().count() as f64;
        (chars * size * 0.6, size * 1.2)
    }
}

impl FontSet for MonospaceMeasurer {
    fn family(&self, _font_weight: u32) -> &str {
        "sans-serif"
    }

    fn font_data(&self) -> Vec<&[u8]> {
        Vec::new()
    }
}

/// Hands out [`MonospaceMeasurer`] for every language.
pub(crate) struct MonospaceFonts;

impl FontProvider for MonospaceFonts {
    fn fonts_for_language(&self, _language: Language) -> anyhow::Result<Arc<dyn FontSet>> {
        Ok(Arc::new(MonospaceMeasurer))
    }
}
