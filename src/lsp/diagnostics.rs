//! Diagnostics conversion from decorations to LSP diagnostics.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};

use crate::document::LineIndex;
use crate::engine::Decoration;
use crate::proofread::SpanKind;

pub const SOURCE: &str = "proofsp";

/// Convert one decoration to a diagnostic. The decoration id travels in `data`
/// so code actions can find it again.
fn decoration_to_diagnostic(decoration: &Decoration, line_index: &LineIndex) -> Diagnostic {
    let span = &decoration.span;
    let severity = match span.kind {
        SpanKind::Spelling => DiagnosticSeverity::INFORMATION,
        SpanKind::Grammar | SpanKind::Style | SpanKind::Other => DiagnosticSeverity::HINT,
    };

    Diagnostic {
        range: line_index.range_of(&(decoration.start..decoration.end)),
        severity: Some(severity),
        code: Some(NumberOrString::String(span.kind.as_code().to_string())),
        code_description: None,
        source: Some(SOURCE.to_string()),
        message: span.message.clone(),
        related_information: None,
        tags: None,
        data: Some(serde_json::json!({ "id": decoration.id.value() })),
    }
}

/// Convert an overlay to LSP diagnostics.
pub fn to_diagnostics(decorations: &[Decoration], line_index: &LineIndex) -> Vec<Diagnostic> {
    decorations
        .iter()
        .map(|decoration| decoration_to_diagnostic(decoration, line_index))
        .collect()
}
