use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use thiserror::Error;

/// Ordering key of a question.
///
/// Ids that parse as non-negative integers compare numerically (so `2` sorts
/// before `10`) and always come before textual ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionId {
    Numeric(u64),
    Text(String),
}

impl QuestionId {
    /// Parse an id from its textual form (JSON object key or file name segment).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u64>() {
            Ok(n) => QuestionId::Numeric(n),
            Err(_) => QuestionId::Text(trimmed.to_string()),
        }
    }
}

impl Ord for QuestionId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (QuestionId::Numeric(a), QuestionId::Numeric(b)) => a.cmp(b),
            (QuestionId::Numeric(_), QuestionId::Text(_)) => Ordering::Less,
            (QuestionId::Text(_), QuestionId::Numeric(_)) => Ordering::Greater,
            (QuestionId::Text(a), QuestionId::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for QuestionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionId::Numeric(n) => write!(f, "{}", n),
            QuestionId::Text(s) => f.write_str(s),
        }
    }
}

/// A single answer option of a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOption {
    pub label: String,
    pub is_correct: bool,
}

/// A quiz question as loaded from the question bank.
///
/// Immutable once loaded. Construction through [`QuestionRecord::new`] enforces
/// that exactly one option is marked correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<AnswerOption>,
}

impl QuestionRecord {
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuestionError> {
        let correct = options.iter().filter(|o| o.is_correct).count();
        if correct != 1 {
            return Err(QuestionError::InvalidOptions {
                id: id.to_string(),
                correct,
            });
        }

        Ok(Self {
            id,
            text: text.into(),
            options,
        })
    }

    /// The label of the single correct option
    pub fn correct_label(&self) -> &str {
        self.options
            .iter()
            .find(|o| o.is_correct)
            .map(|o| o.label.as_str())
            .unwrap_or_default()
    }

    /// Serialize this record as a compact JSON document for the external renderer
    pub fn to_json(&self) -> String {
        let options: IndexMap<&str, bool> = self
            .options
            .iter()
            .map(|o| (o.label.as_str(), o.is_correct))
            .collect();

        serde_json::json!({
            "id": self.id,
            "question": self.text,
            "options": options,
        })
        .to_string()
    }
}

/// Errors raised while loading the question bank
#[derive(Error, Debug)]
pub enum QuestionError {
    #[error("Failed to read question bank {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse question bank {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Question {id} must have exactly one correct option (found {correct})")]
    InvalidOptions { id: String, correct: usize },

    #[error("Duplicate question id: {0}")]
    DuplicateId(String),

    #[error("Questions {first} and {second} would both render to {path}")]
    ClipCollision {
        first: String,
        second: String,
        path: String,
    },

    #[error("Question {id} would render over the final video {path}")]
    FinalVideoCollision { id: String, path: String },
}

/// Options are accepted either as an ordered object or as `[label, correct]` pairs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOptions {
    Map(IndexMap<String, bool>),
    Pairs(Vec<(String, bool)>),
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    options: RawOptions,
}

/// Parse a question bank document.
///
/// The document is a JSON array of single-entry objects keyed by question id:
///
/// ```json
/// [{ "1": { "question": "2 + 2 = ?", "options": { "3": false, "4": true } } }]
/// ```
///
/// The returned records are ordered by id.
pub fn parse_questions(json: &str, source: &str) -> Result<Vec<QuestionRecord>, QuestionError> {
    let entries: Vec<IndexMap<String, RawQuestion>> =
        serde_json::from_str(json).map_err(|e| QuestionError::Parse {
            path: source.to_string(),
            source: e,
        })?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for (raw_id, raw) in entries.into_iter().flatten() {
        let id = QuestionId::parse(&raw_id);
        if !seen.insert(id.clone()) {
            return Err(QuestionError::DuplicateId(id.to_string()));
        }

        let options = match raw.options {
            RawOptions::Map(map) => map
                .into_iter()
                .map(|(label, is_correct)| AnswerOption { label, is_correct })
                .collect(),
            RawOptions::Pairs(pairs) => pairs
                .into_iter()
                .map(|(label, is_correct)| AnswerOption { label, is_correct })
                .collect(),
        };

        records.push(QuestionRecord::new(id, raw.question, options)?);
    }

    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}

/// Load and validate the question bank at `path`
pub fn load_questions(path: &Utf8Path) -> Result<Vec<QuestionRecord>, QuestionError> {
    let content = fs::read_to_string(path).map_err(|e| QuestionError::Io {
        path: path.to_string(),
        source: e,
    })?;

    let records = parse_questions(&content, path.as_str())?;
    tracing::info!("Loaded {} questions from {}", records.len(), path);
    Ok(records)
}
