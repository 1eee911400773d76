use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use expect_test::expect;
use proofsp::document::{snapshot_from_text, text_from_snapshot, DocumentEdit, LineIndex};
use proofsp::engine::{
    spawn, Activation, EditOrigin, EnablementStore, Overlay, PastePolicy, PopupIntent,
    ScreenPoint, SessionConfig, SessionHandle, SessionOutput,
};
use proofsp::lsp::to_diagnostics;
use proofsp::proofread::{
    tokenize, DictionaryProofreader, DictionaryProvider, DictionaryRequest, DictionaryResponse,
    DirectoryDictionaryProvider, FlaggedSpan, ProofreadError, Proofreader, SpanKind,
    SPELLING_MESSAGE,
};
use proofsp::settings::load_settings;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tower_lsp::lsp_types::Diagnostic;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Words to flag, with the replacements to offer for each.
type Flags = &'static [(&'static str, &'static [&'static str])];

/// Flag every occurrence of the listed words in `text`.
fn flag(text: &str, flags: Flags) -> Vec<FlaggedSpan> {
    tokenize(text)
        .into_iter()
        .filter_map(|token| {
            let (_, replacements) = flags.iter().find(|(word, _)| *word == token.word)?;
            Some(FlaggedSpan {
                offset: token.offset,
                length: token.length,
                message: SPELLING_MESSAGE.to_string(),
                replacements: replacements.iter().map(|r| r.to_string()).collect(),
                kind: SpanKind::Spelling,
            })
        })
        .collect()
}

/// Answers immediately and reports every text it was asked about.
struct ScriptedProofreader {
    flags: Flags,
    calls: mpsc::UnboundedSender<String>,
}

impl ScriptedProofreader {
    fn new(flags: Flags) -> (Self, UnboundedReceiver<String>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { flags, calls }, rx)
    }
}

#[async_trait]
impl Proofreader for ScriptedProofreader {
    async fn analyze(
        &self,
        text: &str,
        _locale: Option<&str>,
    ) -> Result<Vec<FlaggedSpan>, ProofreadError> {
        let _ = self.calls.send(text.to_string());
        Ok(flag(text, self.flags))
    }
}

/// A proofreader call waiting for the test to answer it.
struct PendingCall {
    text: String,
    reply: oneshot::Sender<Vec<FlaggedSpan>>,
}

/// Holds every call until the test answers it.
struct GatedProofreader {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl GatedProofreader {
    fn new() -> (Self, UnboundedReceiver<PendingCall>) {
        let (calls, rx) = mpsc::unbounded_channel();
        (Self { calls }, rx)
    }
}

#[async_trait]
impl Proofreader for GatedProofreader {
    async fn analyze(
        &self,
        text: &str,
        _locale: Option<&str>,
    ) -> Result<Vec<FlaggedSpan>, ProofreadError> {
        let (reply, rx) = oneshot::channel();
        let _ = self.calls.send(PendingCall {
            text: text.to_string(),
            reply,
        });
        Ok(rx.await.unwrap_or_default())
    }
}

/// How a proofreader misbehaves after its first answer.
#[derive(Clone, Copy)]
enum Failure {
    Reject,
    Hang,
}

/// Answers the first call, then fails every later one.
struct FailingProofreader {
    flags: Flags,
    failure: Failure,
    answered: AtomicBool,
    calls: mpsc::UnboundedSender<String>,
}

impl FailingProofreader {
    fn new(flags: Flags, failure: Failure) -> (Self, UnboundedReceiver<String>) {
        let (calls, rx) = mpsc::unbounded_channel();
        let proofreader = Self {
            flags,
            failure,
            answered: AtomicBool::new(false),
            calls,
        };
        (proofreader, rx)
    }
}

#[async_trait]
impl Proofreader for FailingProofreader {
    async fn analyze(
        &self,
        text: &str,
        _locale: Option<&str>,
    ) -> Result<Vec<FlaggedSpan>, ProofreadError> {
        let _ = self.calls.send(text.to_string());
        if !self.answered.swap(true, Ordering::SeqCst) {
            return Ok(flag(text, self.flags));
        }
        match self.failure {
            Failure::Reject => Err(ProofreadError::Channel("connection refused".to_string())),
            Failure::Hang => std::future::pending().await,
        }
    }
}

struct NoDictionary;

#[async_trait]
impl DictionaryProvider for NoDictionary {
    async fn fetch(
        &self,
        _request: DictionaryRequest,
    ) -> Result<DictionaryResponse, ProofreadError> {
        Ok(DictionaryResponse::Dictionary { dictionary: None })
    }
}

fn dictionary_proofreader() -> Arc<dyn Proofreader> {
    let provider = DirectoryDictionaryProvider::new(fixtures().join("dictionaries"));
    Arc::new(DictionaryProofreader::new(Arc::new(provider), "en_US"))
}

/// A session over `text` backed by the fixture dictionary.
fn dictionary_session(text: &str) -> (SessionHandle, UnboundedReceiver<SessionOutput>) {
    spawn(
        snapshot_from_text(text, 0),
        dictionary_proofreader(),
        EnablementStore::new(true),
        SessionConfig::default(),
    )
}

async fn next_output(outputs: &mut UnboundedReceiver<SessionOutput>) -> SessionOutput {
    tokio::time::timeout(Duration::from_secs(30), outputs.recv())
        .await
        .expect("timed out waiting for session output")
        .expect("session closed")
}

/// Skip popup intents until the next overlay.
async fn next_overlay(outputs: &mut UnboundedReceiver<SessionOutput>) -> Overlay {
    loop {
        if let SessionOutput::Overlay(overlay) = next_output(outputs).await {
            return overlay;
        }
    }
}

/// Everything the session has already emitted.
fn drain(outputs: &mut UnboundedReceiver<SessionOutput>) -> String {
    let mut lines = Vec::new();
    while let Ok(output) = outputs.try_recv() {
        lines.push(format_output(&output));
    }
    lines.join("\n")
}

/// One line per decoration:
///   <start>..<end> "<covered text>" <kind>: <message> <replacements>
fn format_overlay(overlay: &Overlay) -> String {
    if overlay.decorations.is_empty() {
        return "OK (no decorations)".to_string();
    }
    overlay
        .decorations
        .iter()
        .map(|d| {
            format!(
                "{}..{} {:?} {}: {} {:?}",
                d.start,
                d.end,
                overlay.snapshot.text_between(d.start..d.end),
                d.span.kind.as_code(),
                d.span.message,
                d.span.replacements,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_output(output: &SessionOutput) -> String {
    match output {
        SessionOutput::Overlay(overlay) => {
            let decorations: Vec<String> = overlay
                .decorations
                .iter()
                .map(|d| {
                    format!(
                        "{}..{} {:?}",
                        d.start,
                        d.end,
                        overlay.snapshot.text_between(d.start..d.end)
                    )
                })
                .collect();
            format!(
                "overlay v{}: [{}]",
                overlay.snapshot.version(),
                decorations.join(", ")
            )
        }
        SessionOutput::Popup(PopupIntent::Show(view)) => format!(
            "show {:?} {:?} empty={:?} at left={} bottom={}",
            view.message, view.choices, view.empty_text, view.placement.left, view.placement.bottom,
        ),
        SessionOutput::Popup(PopupIntent::Hide) => "hide".to_string(),
        SessionOutput::ApplyEdit(correction) => {
            let step = &correction.edit.steps()[0];
            format!(
                "apply-edit v{} -> v{}: {}..{} => {:?}",
                correction.base_version(),
                correction.snapshot.version(),
                step.from,
                step.to,
                correction.inserted_text(),
            )
        }
    }
}

/// Same layout as the editor sees it:
///   <start_line>:<start_col>-<end_line>:<end_col> <severity> [<code>]: <message>
fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "OK (no diagnostics)".to_string();
    }

    let mut lines: Vec<String> = diagnostics
        .iter()
        .map(|d| {
            let range = &d.range;
            let severity = match d.severity {
                Some(tower_lsp::lsp_types::DiagnosticSeverity::ERROR) => "error",
                Some(tower_lsp::lsp_types::DiagnosticSeverity::WARNING) => "warning",
                Some(tower_lsp::lsp_types::DiagnosticSeverity::INFORMATION) => "info",
                Some(tower_lsp::lsp_types::DiagnosticSeverity::HINT) => "hint",
                _ => "unknown",
            };
            let code = match &d.code {
                Some(tower_lsp::lsp_types::NumberOrString::String(s)) => format!(" [{}]", s),
                Some(tower_lsp::lsp_types::NumberOrString::Number(n)) => format!(" [{}]", n),
                None => String::new(),
            };
            format!(
                "{}:{}-{}:{} {}{}: {}",
                range.start.line,
                range.start.character,
                range.end.line,
                range.end.character,
                severity,
                code,
                d.message,
            )
        })
        .collect();

    lines.sort();
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Dictionary backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dictionary_backend_flags_prose_but_not_code() {
    let (_session, mut outputs) = dictionary_session("Ths is a tst.\n```\nnot chekced\n```");

    let overlay = next_overlay(&mut outputs).await;
    expect![[r#"
        1..4 "Ths" spelling: Possible spelling mistake found. ["This"]
        10..13 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
    .assert_eq(&format_overlay(&overlay));

    let line_index = LineIndex::new(&overlay.snapshot);
    let diagnostics = to_diagnostics(&overlay.decorations, &line_index);
    expect![[r#"
        0:0-0:3 info [spelling]: Possible spelling mistake found.
        0:9-0:12 info [spelling]: Possible spelling mistake found."#]]
    .assert_eq(&format_diagnostics(&diagnostics));
}

#[tokio::test]
async fn settings_fixture_resolves_dictionary_directory() {
    let dir = fixtures().join("settings");
    let settings = load_settings(&dir.join("proofsp.toml"));

    let config = settings.session_config();
    assert_eq!(config.quiet_period, Duration::from_millis(250));
    assert_eq!(config.popup.max_suggestions, 2);

    // The dictionary path is relative to the settings file.
    let proofreader = settings.build_proofreader(&dir, Arc::new(NoDictionary));
    let spans = proofreader.analyze("Ths citys", None).await.unwrap();
    let found: Vec<_> = spans
        .iter()
        .map(|s| (s.offset, s.length, s.replacements.clone()))
        .collect();
    assert_eq!(
        found,
        vec![
            (0, 3, vec!["This".to_string()]),
            (4, 5, vec!["city".to_string()]),
        ]
    );
}

#[tokio::test]
async fn missing_dictionary_flags_nothing() {
    let proofreader = DictionaryProofreader::new(Arc::new(NoDictionary), "xx_XX");
    let spans = proofreader.analyze("Ths is a tst.", None).await.unwrap();
    assert!(spans.is_empty());
}

// ---------------------------------------------------------------------------
// Popup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accepting_a_suggestion_corrects_without_reanalysis() {
    let (session, mut outputs) = dictionary_session("Ths is a tst.");
    next_overlay(&mut outputs).await;

    let view = session
        .activate(Activation::At(2), ScreenPoint::new(40.0, 100.0))
        .await
        .unwrap()
        .expect("popup should open on the decoration");
    assert_eq!(view.choices, vec!["This".to_string()]);

    let correction = session.accept(0).await.unwrap().expect("correction");
    assert_eq!(
        text_from_snapshot(&correction.snapshot),
        "This is a tst."
    );

    expect![[r#"
        show "Possible spelling mistake found." ["This"] empty=None at left=40 bottom=93
        hide
        overlay v1: [11..14 "tst"]
        apply-edit v0 -> v1: 1..4 => "This""#]]
    .assert_eq(&drain(&mut outputs));

    let state = session.state().await.unwrap();
    assert_eq!(state.generation, 1);
    assert!(!state.analysis_scheduled);
    assert!(!state.analysis_pending);
    assert!(state.popup.is_none());
}

#[tokio::test]
async fn ignoring_a_suggestion_removes_the_decoration() {
    let (session, mut outputs) = dictionary_session("Ths is a tst.");
    next_overlay(&mut outputs).await;

    session
        .activate(Activation::At(11), ScreenPoint::new(0.0, 20.0))
        .await
        .unwrap()
        .expect("popup should open on the decoration");
    let ignored = session.ignore().await.unwrap();
    assert!(ignored.is_some());

    expect![[r#"
        show "Possible spelling mistake found." ["test"] empty=None at left=0 bottom=13
        hide
        overlay v0: [1..4 "Ths"]"#]]
    .assert_eq(&drain(&mut outputs));

    // The document is unchanged and nothing was rescheduled.
    let state = session.state().await.unwrap();
    assert_eq!(state.snapshot.version(), 0);
    assert!(!state.analysis_scheduled);
}

#[tokio::test]
async fn only_one_popup_is_open_at_a_time() {
    let (session, mut outputs) = dictionary_session("Ths is a tst.");
    next_overlay(&mut outputs).await;

    let point = ScreenPoint::new(10.0, 50.0);
    session.activate(Activation::At(2), point).await.unwrap();
    let second = session
        .activate(Activation::At(12), point)
        .await
        .unwrap()
        .expect("second popup");
    assert_eq!(second.choices, vec!["test".to_string()]);

    // Activating plain text closes the popup.
    let nothing = session.activate(Activation::At(6), point).await.unwrap();
    assert!(nothing.is_none());

    session.activate(Activation::At(2), point).await.unwrap();
    session.scroll().unwrap();
    let state = session.state().await.unwrap();
    assert!(state.popup.is_none());

    expect![[r#"
        show "Possible spelling mistake found." ["This"] empty=None at left=10 bottom=43
        hide
        show "Possible spelling mistake found." ["test"] empty=None at left=10 bottom=43
        hide
        show "Possible spelling mistake found." ["This"] empty=None at left=10 bottom=43
        hide"#]]
    .assert_eq(&drain(&mut outputs));
}

#[tokio::test]
async fn popup_without_suggestions_shows_placeholder() {
    let (proofreader, _calls) = ScriptedProofreader::new(&[("zzz", &[])]);
    let (session, mut outputs) = spawn(
        snapshot_from_text("a zzz", 0),
        Arc::new(proofreader),
        EnablementStore::new(true),
        SessionConfig::default(),
    );
    next_overlay(&mut outputs).await;

    let view = session
        .activate(Activation::At(3), ScreenPoint::new(-5.0, 10.0))
        .await
        .unwrap()
        .expect("popup");
    assert!(view.choices.is_empty());
    assert_eq!(view.empty_text.as_deref(), Some("No replacements available"));
    assert_eq!(view.placement.left, 0.0);

    // There is nothing to accept.
    assert!(session.accept(0).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Scheduling and generations
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn edits_are_coalesced_into_one_analysis() {
    let (proofreader, mut calls) = ScriptedProofreader::new(&[("tst", &["test"])]);
    let (session, mut outputs) = spawn(
        snapshot_from_text("a tst", 0),
        Arc::new(proofreader),
        EnablementStore::new(true),
        SessionConfig::default(),
    );
    assert_eq!(calls.recv().await.unwrap(), "a tst");
    next_overlay(&mut outputs).await;

    let start = Instant::now();
    for step in 0..4 {
        if step > 0 {
            sleep(Duration::from_millis(100)).await;
        }
        session
            .edit(DocumentEdit::insert_text(1, "x"), EditOrigin::Typing)
            .await
            .unwrap();
    }
    assert!(session.state().await.unwrap().analysis_scheduled);
    // Each edit re-emits the remapped overlay.
    drain(&mut outputs);

    // One call, one quiet period after the last edit.
    assert_eq!(calls.recv().await.unwrap(), "xxxxa tst");
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(1300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1310), "{elapsed:?}");

    let overlay = next_overlay(&mut outputs).await;
    expect![[r#"7..10 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
        .assert_eq(&format_overlay(&overlay));
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn immediate_paste_policy_skips_the_quiet_period() {
    let (proofreader, mut calls) = ScriptedProofreader::new(&[]);
    let config = SessionConfig {
        paste_policy: PastePolicy::Immediate,
        ..SessionConfig::default()
    };
    let (session, _outputs) = spawn(
        snapshot_from_text("a", 0),
        Arc::new(proofreader),
        EnablementStore::new(true),
        config,
    );
    calls.recv().await.unwrap();

    let start = Instant::now();
    session
        .edit(DocumentEdit::insert_text(2, " pasted"), EditOrigin::Paste)
        .await
        .unwrap();
    assert_eq!(calls.recv().await.unwrap(), "a pasted");
    assert!(start.elapsed() < Duration::from_millis(10));
}

#[tokio::test]
async fn stale_results_are_discarded() {
    let (proofreader, mut calls) = GatedProofreader::new();
    let (session, mut outputs) = spawn(
        snapshot_from_text("Ths is a tst.", 0),
        Arc::new(proofreader),
        EnablementStore::new(true),
        SessionConfig::default(),
    );

    let first = calls.recv().await.unwrap();
    session
        .edit(DocumentEdit::insert_text(1, "Oh "), EditOrigin::Typing)
        .await
        .unwrap();
    session.proofread_now().unwrap();
    let second = calls.recv().await.unwrap();
    assert_eq!(second.text, "Oh Ths is a tst.");

    // The superseded call answers first; its result must never show up.
    first.reply.send(flag(&first.text, &[("Ths", &["This"])])).unwrap();
    second.reply.send(flag(&second.text, &[("tst", &["test"])])).unwrap();

    let overlay = next_overlay(&mut outputs).await;
    expect!["OK (no decorations)"].assert_eq(&format_overlay(&overlay));
    let overlay = next_overlay(&mut outputs).await;
    expect![[r#"13..16 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
        .assert_eq(&format_overlay(&overlay));

    let state = session.state().await.unwrap();
    assert_eq!(state.generation, 2);
    assert!(!state.analysis_pending);
    assert_eq!(drain(&mut outputs), "");
}

#[tokio::test]
async fn results_follow_edits_made_during_analysis() {
    let (proofreader, mut calls) = GatedProofreader::new();
    let (session, mut outputs) = spawn(
        snapshot_from_text("Ths is a tst.", 0),
        Arc::new(proofreader),
        EnablementStore::new(true),
        SessionConfig::default(),
    );

    let call = calls.recv().await.unwrap();
    session
        .edit(DocumentEdit::insert_text(1, "Oh "), EditOrigin::Typing)
        .await
        .unwrap();
    call.reply.send(flag(&call.text, &[("tst", &["test"])])).unwrap();

    next_overlay(&mut outputs).await;
    let overlay = next_overlay(&mut outputs).await;
    assert_eq!(overlay.snapshot.version(), 1);
    expect![[r#"13..16 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
        .assert_eq(&format_overlay(&overlay));
}

// ---------------------------------------------------------------------------
// Enablement and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabling_clears_and_enabling_reanalyses() {
    let (proofreader, mut calls) = ScriptedProofreader::new(&[("tst", &["test"])]);
    let enablement = EnablementStore::new(true);
    let (session, mut outputs) = spawn(
        snapshot_from_text("a tst", 0),
        Arc::new(proofreader),
        Arc::clone(&enablement),
        SessionConfig::default(),
    );
    calls.recv().await.unwrap();
    let overlay = next_overlay(&mut outputs).await;
    expect![[r#"3..6 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
        .assert_eq(&format_overlay(&overlay));

    assert!(enablement.set(false));
    let overlay = next_overlay(&mut outputs).await;
    expect!["OK (no decorations)"].assert_eq(&format_overlay(&overlay));

    // Edits while disabled schedule nothing.
    session
        .edit(DocumentEdit::insert_text(1, "x"), EditOrigin::Typing)
        .await
        .unwrap();
    let state = session.state().await.unwrap();
    assert!(!state.analysis_scheduled);
    assert!(calls.try_recv().is_err());

    assert!(enablement.set(true));
    assert_eq!(calls.recv().await.unwrap(), "xa tst");
    let overlay = loop {
        let overlay = next_overlay(&mut outputs).await;
        if !overlay.decorations.is_empty() {
            break overlay;
        }
    };
    expect![[r#"4..7 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
        .assert_eq(&format_overlay(&overlay));
}

#[tokio::test]
async fn session_stops_when_handles_are_dropped() {
    let (proofreader, _calls) = ScriptedProofreader::new(&[]);
    let enablement = EnablementStore::new(true);
    let (session, mut outputs) = spawn(
        snapshot_from_text("a", 0),
        Arc::new(proofreader),
        Arc::clone(&enablement),
        SessionConfig::default(),
    );
    let other = session.clone();
    assert_eq!(enablement.subscriber_count(), 1);

    drop(session);
    assert!(!other.is_closed());
    drop(other);

    while outputs.recv().await.is_some() {}
    assert_eq!(enablement.subscriber_count(), 0);
}

// ---------------------------------------------------------------------------
// Capability failures
// ---------------------------------------------------------------------------

/// Starts from a good overlay, edits, and lets the next analysis fail.
async fn failed_analysis_keeps_overlay(failure: Failure) {
    let (proofreader, mut calls) = FailingProofreader::new(&[("tst", &["test"])], failure);
    let (session, mut outputs) = spawn(
        snapshot_from_text("a tst", 0),
        Arc::new(proofreader),
        EnablementStore::new(true),
        SessionConfig::default(),
    );
    calls.recv().await.unwrap();
    next_overlay(&mut outputs).await;

    session
        .edit(DocumentEdit::insert_text(1, "x"), EditOrigin::Typing)
        .await
        .unwrap();
    expect![[r#"overlay v1: [4..7 "tst"]"#]].assert_eq(&drain(&mut outputs));

    // The debounced call goes out and fails, or outlives the analysis timeout.
    assert_eq!(calls.recv().await.unwrap(), "xa tst");
    sleep(SessionConfig::default().analysis_timeout + Duration::from_millis(100)).await;

    let state = session.state().await.unwrap();
    assert!(!state.analysis_pending);
    assert!(!state.analysis_scheduled);
    let overlay = Overlay {
        snapshot: state.snapshot,
        decorations: state.decorations,
    };
    expect![[r#"4..7 "tst" spelling: Possible spelling mistake found. ["test"]"#]]
        .assert_eq(&format_overlay(&overlay));

    // Nothing new is published and the call is not retried.
    sleep(Duration::from_secs(30)).await;
    assert_eq!(drain(&mut outputs), "");
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn rejected_analysis_keeps_existing_overlay() {
    failed_analysis_keeps_overlay(Failure::Reject).await;
}

#[tokio::test(start_paused = true)]
async fn timed_out_analysis_keeps_existing_overlay() {
    failed_analysis_keeps_overlay(Failure::Hang).await;
}
