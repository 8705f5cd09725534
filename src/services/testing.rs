//! Test doubles for embedding providers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EmbeddingError;
use crate::services::embedding::EmbeddingProvider;

/// Sentence-structured text of exactly `len` ASCII characters.
pub fn passage(len: usize) -> String {
    let sentence = "The quick brown fox jumps over the lazy dog. ";
    sentence.repeat(len / sentence.len() + 1)[..len].to_string()
}

/// Stable vector derived from the text, so two runs can be compared.
pub fn deterministic_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..dimensions as u64)
        .map(|i| (seed.wrapping_add(i * 7919) % 1000) as f32 / 1000.0)
        .collect()
}

/// Scriptable provider that records every request it receives.
pub struct StubProvider {
    throttles_left: AtomicU32,
    fail: bool,
    dimensions: Option<usize>,
    attempts: AtomicU32,
    requests: Mutex<Vec<Vec<String>>>,
    cancel_on_call: Option<(u32, CancellationToken)>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            throttles_left: AtomicU32::new(0),
            fail: false,
            dimensions: None,
            attempts: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    /// Cancel `token` during call number `call` (1-based); that call still answers.
    pub fn cancelling_on_call(mut self, call: u32, token: CancellationToken) -> Self {
        self.cancel_on_call = Some((call, token));
        self
    }

    /// Answer the first `times` calls with HTTP 429. `u32::MAX` never recovers.
    pub fn throttling(self, times: u32) -> Self {
        self.throttles_left.store(times, Ordering::SeqCst);
        self
    }

    /// Answer every call with a server error.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Return vectors of this length regardless of what was requested.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Texts of every call, in call order.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    async fn embed(
        &self,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let call = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(texts.to_vec());
        if let Some((cancel_call, token)) = &self.cancel_on_call {
            if *cancel_call == call {
                token.cancel();
            }
        }

        let throttled = self
            .throttles_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if throttled {
            return Err(EmbeddingError::Throttled("status 429".to_string()));
        }
        if self.fail {
            return Err(EmbeddingError::ServerError("status 500".to_string()));
        }

        let dimensions = self.dimensions.unwrap_or(dimensions);
        Ok(texts
            .iter()
            .map(|text| deterministic_vector(text, dimensions))
            .collect())
    }

    fn endpoint(&self) -> &str {
        "stub://embeddings"
    }
}
