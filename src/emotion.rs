//! Emotion categories and the score vectors the classifier returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One of the six emotion categories tracked per visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionKey {
    Anger,
    Joy,
    Sadness,
    Fear,
    Neutral,
    Surprise,
}

impl EmotionKey {
    /// Every recognized key, in store order.
    pub const ALL: [EmotionKey; 6] = [
        EmotionKey::Anger,
        EmotionKey::Joy,
        EmotionKey::Sadness,
        EmotionKey::Fear,
        EmotionKey::Neutral,
        EmotionKey::Surprise,
    ];

    /// Name used both on the wire and as the store key.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionKey::Anger => "anger",
            EmotionKey::Joy => "joy",
            EmotionKey::Sadness => "sadness",
            EmotionKey::Fear => "fear",
            EmotionKey::Neutral => "neutral",
            EmotionKey::Surprise => "surprise",
        }
    }

    /// Look up a key by its exact wire name. Anything outside the closed set yields `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.as_str() == name)
    }
}

impl fmt::Display for EmotionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores for the recognized emotions of one page.
///
/// Keys that were not reported are simply absent; they are never filled in with zero.
/// Deserializing drops unknown emotion names and non-numeric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Value>", into = "BTreeMap<EmotionKey, f64>")]
pub struct EmotionVector {
    scores: BTreeMap<EmotionKey, f64>,
}

impl EmotionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a vector from `(name, score)` pairs, ignoring unrecognized names.
    pub fn from_named<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut vector = Self::new();
        for (name, score) in pairs {
            if let Some(key) = EmotionKey::from_name(name.as_ref()) {
                vector.insert(key, score);
            }
        }
        vector
    }

    pub fn insert(&mut self, key: EmotionKey, score: f64) {
        self.scores.insert(key, score);
    }

    /// Builder-style insert, handy when constructing vectors inline.
    pub fn with(mut self, key: EmotionKey, score: f64) -> Self {
        self.insert(key, score);
        self
    }

    pub fn get(&self, key: EmotionKey) -> Option<f64> {
        self.scores.get(&key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionKey, f64)> + '_ {
        self.scores.iter().map(|(key, score)| (*key, *score))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Highest-scoring emotion. Ties go to the key that comes first in `EmotionKey::ALL`.
    pub fn dominant(&self) -> Option<(EmotionKey, f64)> {
        let mut best: Option<(EmotionKey, f64)> = None;
        for key in EmotionKey::ALL {
            if let Some(score) = self.get(key) {
                match best {
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((key, score)),
                }
            }
        }
        best
    }
}

impl From<HashMap<String, Value>> for EmotionVector {
    fn from(raw: HashMap<String, Value>) -> Self {
        Self::from_named(
            raw.iter()
                .filter_map(|(name, value)| value.as_f64().map(|score| (name.as_str(), score))),
        )
    }
}

impl From<EmotionVector> for BTreeMap<EmotionKey, f64> {
    fn from(vector: EmotionVector) -> Self {
        vector.scores
    }
}
