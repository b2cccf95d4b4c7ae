//! Offline stand-in for the hosted emotion classifier.
//!
//! Scans title and body for a few Korean and English cue words per label.
//! Good enough to exercise the tagging path end to end without network.

use async_trait::async_trait;
use mb_core::{Emotion, EmotionTagger, Result};

const CUES: &[(Emotion, &[&str])] = &[
    (Emotion::Joy, &["기뻐", "행복", "좋아", "happy", "glad"]),
    (Emotion::Sadness, &["슬퍼", "우울", "눈물", "sad"]),
    (Emotion::Anger, &["화나", "짜증", "angry"]),
    (Emotion::Anxiety, &["불안", "걱정", "worried", "nervous"]),
    (Emotion::Excitement, &["설레", "신나", "excited"]),
    (Emotion::Calm, &["평온", "차분", "calm"]),
    (Emotion::Tired, &["피곤", "지쳐", "tired"]),
    (Emotion::Lonely, &["외로", "혼자", "lonely"]),
    (Emotion::Grateful, &["고마", "감사", "thanks", "grateful"]),
    (Emotion::Proud, &["뿌듯", "자랑", "proud"]),
];

#[derive(Debug, Default)]
pub struct KeywordTagger;

#[async_trait]
impl EmotionTagger for KeywordTagger {
    async fn tag(&self, title: &str, content: &str) -> Result<Vec<String>> {
        let text = format!("{title} {content}").to_lowercase();
        Ok(CUES
            .iter()
            .filter(|(_, words)| words.iter().any(|w| text.contains(w)))
            .map(|(emotion, _)| emotion.as_str().to_string())
            .collect())
    }
}
