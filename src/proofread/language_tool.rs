//! LanguageTool HTTP backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{FlaggedSpan, ProofreadError, Proofreader, SpanKind};

pub const DEFAULT_ENDPOINT: &str = "https://api.languagetool.org";

/// Body of a `/v2/check` response. Only the fields used here are decoded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckResponse {
    #[serde(default)]
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Match {
    pub message: String,
    /// UTF-16 code units.
    pub offset: usize,
    /// UTF-16 code units.
    pub length: usize,
    #[serde(default)]
    pub replacements: Vec<Replacement>,
    pub rule: Option<Rule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Replacement {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub issue_type: Option<String>,
}

/// Posts text to a LanguageTool server and reports its matches.
pub struct LanguageToolProofreader {
    client: reqwest::Client,
    endpoint: String,
    default_language: String,
}

impl LanguageToolProofreader {
    /// `base_url` is the server root, e.g. `https://api.languagetool.org`.
    ///
    /// Fails if the HTTP client cannot be built with the given timeout.
    pub fn new(
        base_url: &str,
        default_language: &str,
        timeout: Duration,
    ) -> Result<Self, ProofreadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v2/check", base_url.trim_end_matches('/')),
            default_language: language_code(default_language),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// LanguageTool expects `en-US`, dictionaries are named `en_US`.
fn language_code(locale: &str) -> String {
    locale.replace('_', "-")
}

/// Convert LanguageTool matches into character-offset spans over `text`.
///
/// Matches that do not land on character boundaries inside `text` are dropped.
pub fn parse_matches(text: &str, response: CheckResponse) -> Vec<FlaggedSpan> {
    // utf16_to_char[i] is the character index starting at UTF-16 offset i.
    let mut utf16_to_char = Vec::with_capacity(text.len() + 1);
    for (index, c) in text.chars().enumerate() {
        utf16_to_char.push(Some(index));
        if c.len_utf16() == 2 {
            utf16_to_char.push(None);
        }
    }
    utf16_to_char.push(Some(text.chars().count()));

    response
        .matches
        .into_iter()
        .filter_map(|m| {
            let start = (*utf16_to_char.get(m.offset)?)?;
            let end = (*utf16_to_char.get(m.offset + m.length)?)?;
            let kind = m
                .rule
                .as_ref()
                .and_then(|rule| rule.issue_type.as_deref())
                .map(SpanKind::from_issue_type)
                .unwrap_or(SpanKind::Other);
            Some(FlaggedSpan {
                offset: start,
                length: end - start,
                message: m.message,
                replacements: m.replacements.into_iter().map(|r| r.value).collect(),
                kind,
            })
        })
        .collect()
}

#[async_trait]
impl Proofreader for LanguageToolProofreader {
    async fn analyze(
        &self,
        text: &str,
        locale: Option<&str>,
    ) -> Result<Vec<FlaggedSpan>, ProofreadError> {
        let language = locale
            .map(language_code)
            .unwrap_or_else(|| self.default_language.clone());
        debug!(endpoint = %self.endpoint, %language, chars = text.len(), "checking text");

        let response: CheckResponse = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("language", language.as_str()), ("text", text)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_matches(text, response))
    }
}
