//! Settings infrastructure for proofsp.
//!
//! This module loads `proofsp.toml` files and turns them into session
//! configuration and a proofreading backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::document::NodeKind;
use crate::engine::{PastePolicy, PopupOptions, SessionConfig};
use crate::proofread::{
    DictionaryProofreader, DictionaryProvider, DirectoryDictionaryProvider,
    LanguageToolProofreader, Proofreader, DEFAULT_ENDPOINT,
};

pub const SETTINGS_FILE: &str = "proofsp.toml";

/// Root settings structure loaded from proofsp.toml.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub proofread: ProofreadSettings,
    pub popup: PopupOptions,
}

/// Which proofreading backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Dictionary,
    LanguageTool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProofreadSettings {
    /// Initial value of the enablement switch.
    pub enabled: bool,
    pub backend: BackendKind,
    /// Dictionary name / LanguageTool language, e.g. `en_US`.
    pub locale: String,
    /// Quiet period before an edit triggers analysis.
    pub debounce_ms: u64,
    /// Proofreader calls taking longer than this are abandoned.
    pub timeout_ms: u64,
    pub paste: PastePolicy,
    /// Node kinds whose content is never proofread.
    pub exclude_nodes: Vec<String>,
    pub dictionary: Option<DictionarySettings>,
    pub language_tool: LanguageToolSettings,
}

impl Default for ProofreadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::default(),
            locale: "en_US".to_string(),
            debounce_ms: 1000,
            timeout_ms: 5000,
            paste: PastePolicy::default(),
            exclude_nodes: vec![NodeKind::CODE_BLOCK.to_string()],
            dictionary: None,
            language_tool: LanguageToolSettings::default(),
        }
    }
}

/// Local dictionary settings.
#[derive(Debug, Deserialize)]
pub struct DictionarySettings {
    /// Directory holding `<locale>.aff` and `<locale>.dic`.
    /// Relative paths resolve against the directory of proofsp.toml.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LanguageToolSettings {
    pub url: String,
}

impl Default for LanguageToolSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl Settings {
    pub fn session_config(&self) -> SessionConfig {
        let proofread = &self.proofread;
        SessionConfig {
            quiet_period: Duration::from_millis(proofread.debounce_ms),
            paste_policy: proofread.paste,
            analysis_timeout: Duration::from_millis(proofread.timeout_ms),
            locale: Some(proofread.locale.clone()),
            excluded_kinds: proofread
                .exclude_nodes
                .iter()
                .map(NodeKind::new)
                .collect::<HashSet<_>>(),
            popup: self.popup.clone(),
        }
    }

    /// Build the configured backend.
    ///
    /// The dictionary backend reads from the configured directory, or from
    /// `fallback` when no directory is set.
    pub fn build_proofreader(
        &self,
        settings_dir: &Path,
        fallback: Arc<dyn DictionaryProvider>,
    ) -> Arc<dyn Proofreader> {
        let proofread = &self.proofread;
        match proofread.backend {
            BackendKind::Dictionary => self.dictionary_proofreader(settings_dir, fallback),
            BackendKind::LanguageTool => match LanguageToolProofreader::new(
                &proofread.language_tool.url,
                &proofread.locale,
                Duration::from_millis(proofread.timeout_ms),
            ) {
                Ok(proofreader) => {
                    info!(url = %proofread.language_tool.url, "using LanguageTool");
                    Arc::new(proofreader)
                }
                Err(e) => {
                    warn!(error = %e, "cannot build LanguageTool client, using dictionaries");
                    self.dictionary_proofreader(settings_dir, fallback)
                }
            },
        }
    }

    fn dictionary_proofreader(
        &self,
        settings_dir: &Path,
        fallback: Arc<dyn DictionaryProvider>,
    ) -> Arc<dyn Proofreader> {
        let proofread = &self.proofread;
        let provider: Arc<dyn DictionaryProvider> = match &proofread.dictionary {
            Some(dictionary) => {
                let dir = if dictionary.path.is_absolute() {
                    dictionary.path.clone()
                } else {
                    settings_dir.join(&dictionary.path)
                };
                info!(dir = %dir.display(), "using dictionaries from disk");
                Arc::new(DirectoryDictionaryProvider::new(dir))
            }
            None => fallback,
        };
        Arc::new(DictionaryProofreader::new(provider, proofread.locale.clone()))
    }
}

/// Load settings from a proofsp.toml file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse settings");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover proofsp.toml by searching up the directory tree, then direct children.
///
/// Search order:
/// 1. Walk up from `start_dir` to filesystem root
/// 2. If not found, check immediate child directories of `start_dir`
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// containing the found proofsp.toml (used for resolving relative paths).
/// If not found, returns `(Settings::default(), start_dir)`.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    // Phase 1: Walk up from start_dir
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(SETTINGS_FILE);
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    // Phase 2: Check immediate child directories
    if let Ok(entries) = std::fs::read_dir(start_dir) {
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        dirs.sort();
        for dir in dirs {
            let candidate = dir.join(SETTINGS_FILE);
            if candidate.is_file() {
                return (load_settings(&candidate), dir);
            }
        }
    }

    (Settings::default(), start_dir.to_path_buf())
}
