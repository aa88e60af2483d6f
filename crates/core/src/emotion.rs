//! Emotion auto-detection for synthesis requests.
//!
//! Classifies text into a small fixed category set using ordered
//! keyword/punctuation rules. No model required - works entirely offline.
//! The first matching rule wins and rule order is fixed: punctuation
//! rules run before keyword lists, the fallback is neutral.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of emotion categories understood by the synthesis backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Surprised,
    Contemplative,
    Happy,
    Sad,
    Angry,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Surprised => "surprised",
            Emotion::Contemplative => "contemplative",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "neutral" => Ok(Emotion::Neutral),
            "surprised" => Ok(Emotion::Surprised),
            "contemplative" => Ok(Emotion::Contemplative),
            "happy" => Ok(Emotion::Happy),
            "sad" => Ok(Emotion::Sad),
            "angry" => Ok(Emotion::Angry),
            other => Err(UnknownEmotion(other.to_string())),
        }
    }
}

/// Error for emotion strings outside the closed category set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion category: {0}")]
pub struct UnknownEmotion(pub String);

const HAPPY_KEYWORDS: &[&str] = &[
    "yay", "awesome", "amazing", "wonderful", "great", "love", "haha", "hehe", "excited",
];

const SAD_KEYWORDS: &[&str] = &[
    "sorry", "sad", "unfortunately", "miss you", "lonely", "cry", "crying", "sigh",
];

const ANGRY_KEYWORDS: &[&str] = &[
    "angry", "furious", "hate", "annoying", "stop it", "unacceptable",
];

/// Detect the emotion of a line of text.
///
/// Rules, in order (first match wins):
/// 1. Two or more `!` anywhere: surprised.
/// 2. Two or more `?` anywhere: contemplative.
/// 3. Happy, sad, then angry keyword lists (case-insensitive substring).
/// 4. Neutral.
pub fn detect(text: &str) -> Emotion {
    if text.matches('!').count() >= 2 {
        return Emotion::Surprised;
    }
    if text.matches('?').count() >= 2 {
        return Emotion::Contemplative;
    }

    let lowered = text.to_lowercase();
    if contains_any(&lowered, HAPPY_KEYWORDS) {
        return Emotion::Happy;
    }
    if contains_any(&lowered, SAD_KEYWORDS) {
        return Emotion::Sad;
    }
    if contains_any(&lowered, ANGRY_KEYWORDS) {
        return Emotion::Angry;
    }

    Emotion::Neutral
}

fn contains_any(lowered: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| lowered.contains(kw))
}
