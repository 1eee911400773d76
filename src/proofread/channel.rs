//! Dictionary acquisition messages and providers.
//!
//! Dictionaries are requested with `{"type": "getDictionary", "locale": ...}`
//! and answered with `{"type": "dictionary", "dictionary": {...} | null}`. A
//! `null` dictionary is a valid answer and disables local spell checking for
//! that locale.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProofreadError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DictionaryRequest {
    GetDictionary { locale: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DictionaryResponse {
    Dictionary {
        dictionary: Option<DictionaryPayload>,
    },
}

/// Raw contents of a Hunspell `.aff` and `.dic` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryPayload {
    pub affix_data: String,
    pub word_list_data: String,
}

/// Answers dictionary requests.
#[async_trait]
pub trait DictionaryProvider: Send + Sync {
    async fn fetch(&self, request: DictionaryRequest) -> Result<DictionaryResponse, ProofreadError>;
}

/// Serves `<dir>/<locale>.aff` and `<dir>/<locale>.dic`.
///
/// `en-US` also finds `en_US.*`.
#[derive(Debug, Clone)]
pub struct DirectoryDictionaryProvider {
    dir: PathBuf,
}

impl DirectoryDictionaryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_pair(&self, stem: &str) -> Result<Option<DictionaryPayload>, ProofreadError> {
        let aff = self.dir.join(format!("{}.aff", stem));
        let dic = self.dir.join(format!("{}.dic", stem));
        let affix_data = match read_optional(&aff).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        let word_list_data = match read_optional(&dic).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        Ok(Some(DictionaryPayload {
            affix_data,
            word_list_data,
        }))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, ProofreadError> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProofreadError::Channel(format!(
            "failed to read '{}': {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl DictionaryProvider for DirectoryDictionaryProvider {
    async fn fetch(&self, request: DictionaryRequest) -> Result<DictionaryResponse, ProofreadError> {
        let DictionaryRequest::GetDictionary { locale } = request;

        let mut candidates = vec![locale.clone()];
        let underscored = locale.replace('-', "_");
        if underscored != locale {
            candidates.push(underscored);
        }

        for stem in &candidates {
            if let Some(payload) = self.read_pair(stem).await? {
                debug!(locale, dir = %self.dir.display(), "found dictionary");
                return Ok(DictionaryResponse::Dictionary {
                    dictionary: Some(payload),
                });
            }
        }

        Ok(DictionaryResponse::Dictionary { dictionary: None })
    }
}
