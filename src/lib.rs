//! Proofreading language server and engine.
//!
//! The engine (`engine`) runs spelling and grammar analysis against a live
//! document, keeping an overlay of flagged spans aligned while the document
//! changes. The language server publishes that overlay as diagnostics and
//! exposes the suggestion popup through code actions and commands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc::UnboundedReceiver;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};
use tracing::{debug, info, warn};

pub mod document;
pub mod engine;
pub mod lsp;
pub mod proofread;
pub mod settings;

pub use settings::Settings;

use document::{snapshot_from_text, DocumentEntry, DocumentStore, LineIndex};
use engine::{
    Activation, DecorationId, EditOrigin, EnablementStore, ScreenPoint, SessionError,
    SessionOutput,
};
use lsp::{ClientDictionaryProvider, ServerCommand};
use proofread::Proofreader;

pub struct Backend {
    client: Client,
    documents: DocumentStore,
    settings: OnceLock<(Settings, PathBuf)>,
    proofreader: OnceLock<Arc<dyn Proofreader>>,
    enablement: Arc<EnablementStore>,
}

fn session_error(e: SessionError) -> Error {
    warn!(error = %e, "session request failed");
    Error::internal_error()
}

/// Where a code action request points, in the (line, column) grid the popup
/// placement is computed in.
fn screen_point(position: Position) -> ScreenPoint {
    ScreenPoint::new(f64::from(position.character), f64::from(position.line))
}

/// Decoration ids carried in our own diagnostics.
fn decoration_ids(diagnostics: &[Diagnostic]) -> Vec<DecorationId> {
    diagnostics
        .iter()
        .filter(|d| d.source.as_deref() == Some(lsp::SOURCE))
        .filter_map(|d| d.data.as_ref()?.get("id")?.as_u64())
        .map(DecorationId::new)
        .collect()
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            documents: DocumentStore::new(),
            settings: OnceLock::new(),
            proofreader: OnceLock::new(),
            enablement: EnablementStore::new(Settings::default().proofread.enabled),
        }
    }

    fn settings(&self) -> &(Settings, PathBuf) {
        self.settings.get_or_init(|| {
            let dir = std::env::current_dir().unwrap_or_default();
            (Settings::default(), dir)
        })
    }

    fn proofreader(&self) -> Arc<dyn Proofreader> {
        let proofreader = self.proofreader.get_or_init(|| {
            let (settings, dir) = self.settings();
            let fallback = Arc::new(ClientDictionaryProvider::new(self.client.clone()));
            settings.build_proofreader(dir, fallback)
        });
        Arc::clone(proofreader)
    }

    /// Start a session for a newly opened document.
    fn open_document(&self, uri: Url, text: &str, version: i32) {
        let snapshot = snapshot_from_text(text, 0);
        let config = self.settings().0.session_config();
        let (session, outputs) = engine::spawn(
            snapshot.clone(),
            self.proofreader(),
            Arc::clone(&self.enablement),
            config,
        );
        self.documents
            .open(uri.clone(), DocumentEntry::new(session, snapshot, version));
        tokio::spawn(forward_outputs(
            self.client.clone(),
            self.documents.clone(),
            uri,
            outputs,
        ));
    }

    async fn accept_suggestion(
        &self,
        uri: Url,
        decoration: DecorationId,
        choice: usize,
    ) -> Result<Option<serde_json::Value>> {
        let Some(session) = self.documents.session(&uri) else {
            return Ok(None);
        };
        let activated = session
            .activate(Activation::Decoration(decoration), ScreenPoint::default())
            .await
            .map_err(session_error)?;
        if activated.is_none() {
            debug!(%uri, %decoration, "suggestion target is gone");
            return Ok(None);
        }
        let Some(correction) = session.accept(choice).await.map_err(session_error)? else {
            return Ok(None);
        };

        // Corrections are a single replace step against the base document.
        let line_index = LineIndex::new(&correction.base);
        let range = correction
            .edit
            .steps()
            .first()
            .map(|step| line_index.range_of(&(step.from..step.to)));
        let Some(range) = range else {
            return Ok(None);
        };
        let edits = vec![TextEdit {
            range,
            new_text: correction.inserted_text(),
        }];

        // The client echoes the correction through didChange; by then the
        // session already holds that content, so the echo is a no-op edit.
        self.documents
            .mirror(&uri, correction.snapshot.clone(), None);

        let workspace_edit = WorkspaceEdit {
            changes: Some(HashMap::from([(uri.clone(), edits)])),
            ..Default::default()
        };
        match self.client.apply_edit(workspace_edit).await {
            Ok(response) if response.applied => {}
            Ok(response) => {
                warn!(%uri, reason = ?response.failure_reason, "client rejected correction")
            }
            Err(e) => warn!(%uri, error = %e, "failed to send correction"),
        }
        Ok(None)
    }

    async fn ignore_suggestion(
        &self,
        uri: Url,
        decoration: DecorationId,
    ) -> Result<Option<serde_json::Value>> {
        let Some(session) = self.documents.session(&uri) else {
            return Ok(None);
        };
        let activated = session
            .activate(Activation::Decoration(decoration), ScreenPoint::default())
            .await
            .map_err(session_error)?;
        if activated.is_some() {
            session.ignore().await.map_err(session_error)?;
        }
        Ok(None)
    }
}

/// Publish a session's overlays as diagnostics until the session ends.
async fn forward_outputs(
    client: Client,
    documents: DocumentStore,
    uri: Url,
    mut outputs: UnboundedReceiver<SessionOutput>,
) {
    while let Some(output) = outputs.recv().await {
        match output {
            SessionOutput::Overlay(overlay) => {
                let Some(entry) = documents.get(&uri) else {
                    break;
                };
                let current = entry.snapshot.version();
                let shown = overlay.snapshot.version();
                if shown < current {
                    // A newer overlay is already queued.
                    continue;
                }
                let version = (shown == current).then_some(entry.lsp_version);
                let line_index = LineIndex::new(&overlay.snapshot);
                let diagnostics = lsp::to_diagnostics(&overlay.decorations, &line_index);
                client
                    .publish_diagnostics(uri.clone(), diagnostics, version)
                    .await;
            }
            SessionOutput::Popup(intent) => debug!(%uri, ?intent, "popup"),
            // Sent by the command that accepted the suggestion.
            SessionOutput::ApplyEdit(_) => {}
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Extract workspace root from params
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        if let Some(root) = workspace_root {
            // Discover settings by walking up the directory tree
            let (settings, settings_dir) = settings::discover_settings(&root);
            info!(dir = %settings_dir.display(), "settings loaded");
            self.enablement.set(settings.proofread.enabled);
            let _ = self.settings.set((settings, settings_dir));
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        ..Default::default()
                    },
                )),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: lsp::commands(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "proofsp language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.open_document(
            params.text_document.uri,
            &params.text_document.text,
            params.text_document.version,
        );
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // We use FULL sync, so there's exactly one change with the full text
        let Some(change) = params.content_changes.into_iter().next() else {
            return;
        };
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        let Some(entry) = self.documents.get(&uri) else {
            self.open_document(uri, &change.text, version);
            return;
        };

        // The session diffs against its own snapshot, in the order requests
        // reach it. Diffing here could race with a concurrent didChange.
        let next = snapshot_from_text(&change.text, 0);
        match entry.session.replace(next, EditOrigin::Typing).await {
            Ok(snapshot) => self.documents.mirror(&uri, snapshot, Some(version)),
            Err(e) => warn!(%uri, error = %e, "failed to apply change"),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.documents.close(&params.text_document.uri);
        // Clear diagnostics
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = params.text_document.uri;
        let Some(entry) = self.documents.get(&uri) else {
            return Ok(None);
        };
        let point = screen_point(params.range.start);

        let mut view = None;
        for id in decoration_ids(&params.context.diagnostics) {
            view = entry
                .session
                .activate(Activation::Decoration(id), point)
                .await
                .map_err(session_error)?;
            if view.is_some() {
                break;
            }
        }
        if view.is_none() {
            let line_index = LineIndex::new(&entry.snapshot);
            let Some(position) = line_index.document_position(params.range.start) else {
                return Ok(None);
            };
            view = entry
                .session
                .activate(Activation::At(position), point)
                .await
                .map_err(session_error)?;
        }
        let Some(view) = view else {
            return Ok(None);
        };

        let diagnostics: Vec<Diagnostic> = params
            .context
            .diagnostics
            .into_iter()
            .filter(|d| decoration_ids(std::slice::from_ref(d)) == [view.decoration])
            .collect();
        Ok(Some(lsp::popup_actions(&uri, &view, diagnostics)))
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> Result<Option<serde_json::Value>> {
        let command = lsp::parse_command(&params).map_err(|e| Error::invalid_params(e.to_string()))?;
        match command {
            ServerCommand::Accept {
                uri,
                decoration,
                choice,
            } => self.accept_suggestion(uri, decoration, choice).await,
            ServerCommand::Ignore { uri, decoration } => {
                self.ignore_suggestion(uri, decoration).await
            }
            ServerCommand::Toggle => {
                let enabled = self.enablement.toggle();
                let message = if enabled {
                    "Proofreading enabled"
                } else {
                    "Proofreading disabled"
                };
                self.client.log_message(MessageType::INFO, message).await;
                Ok(Some(serde_json::Value::Bool(enabled)))
            }
            ServerCommand::CheckDocument { uri } => {
                if let Some(session) = self.documents.session(&uri) {
                    session.proofread_now().map_err(session_error)?;
                }
                Ok(None)
            }
        }
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::new(Backend::new)
}
