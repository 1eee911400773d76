//! LSP protocol feature implementations.
//!
//! This module provides implementations for LSP features:
//! - Diagnostics conversion from the decoration overlay
//! - Code actions and commands for the suggestion popup
//! - The `proofsp/getDictionary` client request

mod code_action;
mod diagnostics;
mod dictionary;

pub use code_action::{
    commands, parse_command, popup_actions, CommandError, ServerCommand, ACCEPT_SUGGESTION,
    CHECK_DOCUMENT, IGNORE_SUGGESTION, TOGGLE,
};
pub use diagnostics::{to_diagnostics, SOURCE};
pub use dictionary::{ClientDictionaryProvider, GetDictionary};
