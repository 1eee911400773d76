//! Pluggable proofreading capabilities.
//!
//! A [`Proofreader`] takes plain text and returns flagged spans. Spans are
//! expressed in character offsets into that text; they only mean something
//! against the offset map the text was built with.
//!
//! Backends:
//! - [`DictionaryProofreader`]: Hunspell-style word lists, fetched lazily
//!   through a [`DictionaryProvider`]
//! - [`LanguageToolProofreader`]: the LanguageTool HTTP API

mod channel;
mod dictionary;
mod language_tool;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use channel::{
    DictionaryPayload, DictionaryProvider, DictionaryRequest, DictionaryResponse,
    DirectoryDictionaryProvider,
};
pub use dictionary::{tokenize, DictionaryProofreader, Token, WordList, SPELLING_MESSAGE};
pub use language_tool::{parse_matches, CheckResponse, LanguageToolProofreader, DEFAULT_ENDPOINT};

/// Category of a flagged span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    Spelling,
    Grammar,
    Style,
    Other,
}

impl SpanKind {
    /// Classify a LanguageTool `rule.issueType`.
    pub fn from_issue_type(issue_type: &str) -> Self {
        match issue_type {
            "misspelling" => SpanKind::Spelling,
            "grammar" | "typographical" | "duplication" => SpanKind::Grammar,
            "style" | "register" | "locale-violation" => SpanKind::Style,
            _ => SpanKind::Other,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            SpanKind::Spelling => "spelling",
            SpanKind::Grammar => "grammar",
            SpanKind::Style => "style",
            SpanKind::Other => "other",
        }
    }
}

/// A region of plain text the proofreader has an opinion about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedSpan {
    /// Character offset into the analysed text.
    pub offset: usize,
    /// Length in characters.
    pub length: usize,
    pub message: String,
    /// Ordered best first; may be empty.
    pub replacements: Vec<String>,
    pub kind: SpanKind,
}

#[derive(Debug, Error)]
pub enum ProofreadError {
    #[error("proofreading request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("proofreading timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid dictionary: {0}")]
    Dictionary(String),
    #[error("dictionary channel failed: {0}")]
    Channel(String),
}

/// Something that can flag spelling and grammar problems in plain text.
#[async_trait]
pub trait Proofreader: Send + Sync {
    /// Analyse `text`. `locale` overrides the backend's default language.
    async fn analyze(
        &self,
        text: &str,
        locale: Option<&str>,
    ) -> Result<Vec<FlaggedSpan>, ProofreadError>;
}
