use crate::error::Result;
use crate::tokenizer::{self, Tokens};
use serde::{Deserialize, Serialize};

// --- Users ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
}

/// Signup data. The password must already be hashed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewUser {
    pub login: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub is_admin: bool,
}

// --- Idiom hierarchy ---

/// A language or dialect. `group_id` points at the parent idiom; `None` marks a top-level group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Idiom {
    pub id: i64,
    pub name: String,
    pub group_id: Option<i64>,
}

impl Idiom {
    pub fn is_root(&self) -> bool {
        self.group_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdiomFilter {
    #[default]
    All,
    Name(String),
    Id(i64),
}

// --- Corpora ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    pub id: i64,
    pub name: String,
    pub source: String,
    pub description: String,
    pub idiom_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewCorpus {
    pub name: String,
    pub source: String,
    pub description: String,
    pub idiom_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CorpusFilter {
    #[default]
    All,
    Name(String),
    Id(i64),
    Idiom(i64),
}

// --- Sentences and words ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub id: i64,
    pub corpus_id: i64,
    pub text: String,
    pub translation: Option<String>,
}

impl Sentence {
    /// Word tokens of the sentence text, zero-indexed.
    pub fn tokens(&self) -> Tokens<'_> {
        tokenizer::tokenize(&self.text)
    }

    pub fn word_at(&self, index: usize) -> Result<&str> {
        tokenizer::word_at(&self.text, index)
    }
}

/// An annotated token position of a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: i64,
    pub sentence_id: i64,
    pub number: i64,
    #[serde(default)]
    pub morphs: Vec<Morph>,
}

// --- Morphs and glosses ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Morph {
    pub id: i64,
    pub text: String,
    pub idiom_id: i64,
    #[serde(default)]
    pub glosses: Vec<Gloss>,
}

impl Morph {
    /// Gloss tags joined with '.', the usual interlinear notation (e.g. "3.SG").
    pub fn gloss_label(&self) -> String {
        self.glosses
            .iter()
            .map(|g| g.tag.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gloss {
    pub id: i64,
    pub tag: String,
    pub definition: String,
    pub note: Option<String>,
}

/// Criteria for morph lookups. Unset fields do not constrain the result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MorphFilter {
    pub id: Option<i64>,
    pub ids: Option<Vec<i64>>,
    pub text: Option<String>,
    pub idiom_id: Option<i64>,
}

/// Criteria for gloss lookups. Unset fields do not constrain the result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlossFilter {
    pub id: Option<i64>,
    pub ids: Option<Vec<i64>>,
    pub tag: Option<String>,
}

/// How `add_morph` decides that a morph already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MorphMatch {
    /// An existing morph with the same text and idiom that already carries every
    /// requested gloss counts as a duplicate, even if it carries more.
    #[default]
    Covering,
    /// Only a morph with the same text, idiom and exactly the same gloss set is a duplicate.
    Exact,
}

// --- Interlinear view ---

/// One token of a sentence aligned with its stored annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterlinearRow {
    pub index: usize,
    pub token: String,
    pub word: Option<Word>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interlinear {
    pub sentence: Sentence,
    pub rows: Vec<InterlinearRow>,
    /// Stored words whose number does not match any token position.
    pub orphans: Vec<Word>,
}
