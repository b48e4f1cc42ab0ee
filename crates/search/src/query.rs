//! Query builder
//!
//! Turns request parameters into the token set the scorer matches against.
//! Tokens are folded (lowercase, no diacritics) and kept in a `BTreeSet` so
//! iteration order never depends on hashing.

use curriforge_common::text;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Retrieval request parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalParams {
    /// Secondary grade, 1..=5 (6 accepted for primary-level corpora)
    #[serde(default)]
    pub grade: Option<u8>,

    #[serde(default)]
    pub area: Option<String>,

    #[serde(default)]
    pub competency: Option<String>,

    /// Free-text topic
    #[serde(default)]
    pub topic: Option<String>,
}

/// Normalised query tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTokens(BTreeSet<String>);

impl QueryTokens {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for QueryTokens {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "al", "como", "con", "de", "del", "e", "el", "en", "es", "la", "las", "lo", "los",
    "o", "para", "por", "que", "se", "su", "sus", "u", "un", "una", "y",
];

const GRADE_ORDINALS: &[&str] = &["primero", "segundo", "tercero", "cuarto", "quinto", "sexto"];

/// Area word → extra tokens commonly found in curricular text
const AREA_SYNONYMS: &[(&str, &[&str])] = &[
    ("matematica", &["matematicas", "problemas"]),
    ("ciencia", &["cientifica", "indagacion"]),
    ("tecnologia", &["tecnologica", "tecnologicas"]),
    ("comunicacion", &["lectura", "escritura", "oral"]),
    ("arte", &["artistica", "artisticos"]),
    ("historia", &["historica", "historicas"]),
    ("geografia", &["ambiente", "espacio"]),
    ("economia", &["economica", "economicos"]),
    ("religiosa", &["religion", "fe"]),
    ("fisica", &["motricidad"]),
    ("tutoria", &["convivencia", "socioemocional"]),
];

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    drop_stop_words: bool,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self { drop_stop_words: true }
    }
}

impl QueryBuilder {
    pub fn new(drop_stop_words: bool) -> Self {
        Self { drop_stop_words }
    }

    /// Build the token set. Empty parameters give an empty set.
    pub fn build(&self, params: &RetrievalParams) -> QueryTokens {
        let mut tokens = BTreeSet::new();

        for field in [&params.area, &params.competency, &params.topic] {
            if let Some(value) = field {
                tokens.extend(text::words(value).filter(|word| self.keep(word)));
            }
        }

        if let Some(area) = &params.area {
            for word in text::words(area) {
                if let Some((_, synonyms)) = AREA_SYNONYMS.iter().find(|(key, _)| *key == word) {
                    tokens.extend(synonyms.iter().map(|s| s.to_string()));
                }
            }
        }

        if let Some(grade) = params.grade {
            tokens.insert(grade.to_string());
            if let Some(ordinal) = ordinal(grade) {
                tokens.insert(ordinal.to_string());
            }
        }

        QueryTokens(tokens)
    }

    fn keep(&self, word: &str) -> bool {
        !(self.drop_stop_words && STOP_WORDS.contains(&word))
    }
}

/// Spanish ordinal for a grade number (`3` → `tercero`)
pub fn ordinal(grade: u8) -> Option<&'static str> {
    grade
        .checked_sub(1)
        .and_then(|index| GRADE_ORDINALS.get(index as usize))
        .copied()
}
