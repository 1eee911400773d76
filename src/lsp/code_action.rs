//! Code actions and workspace commands for the suggestion popup.
//!
//! An open popup is rendered as a list of code actions: one quick fix per
//! captured suggestion, an "Ignore" action, and a disabled action carrying the
//! "no suggestions" text when there is nothing to offer.

use serde_json::Value;
use thiserror::Error;
use tower_lsp::lsp_types::{
    CodeAction, CodeActionDisabled, CodeActionKind, CodeActionOrCommand, Command, Diagnostic,
    ExecuteCommandParams, Url,
};

use crate::engine::{DecorationId, PopupView};

pub const ACCEPT_SUGGESTION: &str = "proofsp.acceptSuggestion";
pub const IGNORE_SUGGESTION: &str = "proofsp.ignoreSuggestion";
pub const TOGGLE: &str = "proofsp.toggle";
pub const CHECK_DOCUMENT: &str = "proofsp.checkDocument";

/// Commands advertised in the server capabilities.
pub fn commands() -> Vec<String> {
    [ACCEPT_SUGGESTION, IGNORE_SUGGESTION, TOGGLE, CHECK_DOCUMENT]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// Render a popup as code actions.
pub fn popup_actions(
    uri: &Url,
    view: &PopupView,
    diagnostics: Vec<Diagnostic>,
) -> Vec<CodeActionOrCommand> {
    let id = view.decoration.value();
    let mut actions = Vec::with_capacity(view.choices.len() + 2);

    for (index, choice) in view.choices.iter().enumerate() {
        let title = format!("Replace with '{}'", choice);
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: title.clone(),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(diagnostics.clone()),
            command: Some(Command {
                title,
                command: ACCEPT_SUGGESTION.to_string(),
                arguments: Some(vec![
                    Value::from(uri.as_str()),
                    Value::from(id),
                    Value::from(index),
                ]),
            }),
            is_preferred: Some(index == 0),
            ..Default::default()
        }));
    }

    if let Some(text) = &view.empty_text {
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: text.clone(),
            kind: Some(CodeActionKind::QUICKFIX),
            disabled: Some(CodeActionDisabled {
                reason: text.clone(),
            }),
            ..Default::default()
        }));
    }

    actions.push(CodeActionOrCommand::CodeAction(CodeAction {
        title: "Ignore".to_string(),
        kind: Some(CodeActionKind::QUICKFIX),
        diagnostics: Some(diagnostics),
        command: Some(Command {
            title: "Ignore".to_string(),
            command: IGNORE_SUGGESTION.to_string(),
            arguments: Some(vec![Value::from(uri.as_str()), Value::from(id)]),
        }),
        ..Default::default()
    }));

    actions
}

/// A parsed `workspace/executeCommand` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Accept {
        uri: Url,
        decoration: DecorationId,
        choice: usize,
    },
    Ignore {
        uri: Url,
        decoration: DecorationId,
    },
    Toggle,
    CheckDocument {
        uri: Url,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("invalid arguments for '{command}': {reason}")]
    BadArguments { command: String, reason: String },
}

fn argument<T: serde::de::DeserializeOwned>(
    params: &ExecuteCommandParams,
    index: usize,
) -> Result<T, CommandError> {
    let bad = |reason: String| CommandError::BadArguments {
        command: params.command.clone(),
        reason,
    };
    let value = params
        .arguments
        .get(index)
        .ok_or_else(|| bad(format!("missing argument {}", index)))?;
    serde_json::from_value(value.clone()).map_err(|e| bad(format!("argument {}: {}", index, e)))
}

pub fn parse_command(params: &ExecuteCommandParams) -> Result<ServerCommand, CommandError> {
    match params.command.as_str() {
        ACCEPT_SUGGESTION => Ok(ServerCommand::Accept {
            uri: argument(params, 0)?,
            decoration: DecorationId::new(argument(params, 1)?),
            choice: argument(params, 2)?,
        }),
        IGNORE_SUGGESTION => Ok(ServerCommand::Ignore {
            uri: argument(params, 0)?,
            decoration: DecorationId::new(argument(params, 1)?),
        }),
        TOGGLE => Ok(ServerCommand::Toggle),
        CHECK_DOCUMENT => Ok(ServerCommand::CheckDocument {
            uri: argument(params, 0)?,
        }),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
