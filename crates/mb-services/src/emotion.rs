//! Client side of the hosted sentiment model.
//!
//! The model may fail, lag, or answer with labels outside the vocabulary.
//! Callers get at most [`MAX_EMOTIONS`] known labels, or none at all.

use mb_core::{Emotion, EmotionTagger};
use std::time::Duration;

pub const MAX_EMOTIONS: usize = 3;

/// Keeps known labels, first occurrence wins, capped at [`MAX_EMOTIONS`].
pub fn clamp_emotions<S: AsRef<str>>(labels: &[S]) -> Vec<Emotion> {
    let mut out: Vec<Emotion> = Vec::with_capacity(MAX_EMOTIONS);
    for label in labels {
        let Some(emotion) = Emotion::from_label(label.as_ref()) else {
            tracing::debug!(label = label.as_ref(), "dropping unknown emotion label");
            continue;
        };
        if !out.contains(&emotion) {
            out.push(emotion);
        }
        if out.len() == MAX_EMOTIONS {
            break;
        }
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Pause between attempts, multiplied by the attempt number.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Asks the tagger, retrying failures. Exhausted retries yield no tags.
pub async fn detect_emotions(
    tagger: &dyn EmotionTagger,
    policy: RetryPolicy,
    title: &str,
    content: &str,
) -> Vec<Emotion> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match tagger.tag(title, content).await {
            Ok(labels) => return clamp_emotions(&labels),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, error = %e, "emotion tagging failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "emotion tagging gave up");
            }
        }
    }
    Vec::new()
}
