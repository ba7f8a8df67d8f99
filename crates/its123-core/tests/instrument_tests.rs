//! Instrument state machine against scripted capabilities

use its123_core::{
    headers, ApiClient, ClientConfig, ClientError, EventBus, EventKind, InstrumentPhase,
    InstrumentStateMachine, InstrumentStatus, Method, RetryPolicy, Severity,
};
use its123_store::{MemoryBackend, PersistentStore};
use its123_test_utils::{
    error_response, instrument_response, EventLog, QueuedSubmissions, RecordingRenderer,
    ScriptedHttp, NEXT_ITEMS_PATH,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn api(http: &Arc<ScriptedHttp>) -> ApiClient {
    ApiClient::new(Arc::new(ClientConfig::new("test-key")), http.clone())
}

#[tokio::test]
async fn terminal_first_page_completes_without_rendering() {
    let http = ScriptedHttp::new();
    http.on_instrument_get("I1", instrument_response("ended-skipped", ""));
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let submissions = QueuedSubmissions::new([]);
    let events = EventBus::default();
    let log = EventLog::attach(&events);

    let machine = InstrumentStateMachine::new(&api, &renderer, &submissions, &events);
    let status = machine.run("I1").await.unwrap();

    assert_eq!(status, InstrumentStatus::EndedSkipped);
    assert_eq!(machine.phase(), InstrumentPhase::Completed);
    assert!(renderer.calls().is_empty());
    assert_eq!(log.names(), vec!["instrument-started", "instrument-completed"]);
}

#[tokio::test]
async fn pages_loop_until_terminal() {
    let http = ScriptedHttp::new();
    http.on_instrument_get("I1", instrument_response("started", "page-1"));
    http.on_instrument_post("I1", Ok(instrument_response("in-progress", "page-2")));
    http.on_instrument_post("I1", Ok(instrument_response("ended-items", "")));
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let submissions = QueuedSubmissions::repeated(2);
    let events = EventBus::default();
    let store = PersistentStore::new(Arc::new(MemoryBackend::new()));

    let machine = InstrumentStateMachine::new(&api, &renderer, &submissions, &events)
        .with_store(Some(&store));
    machine.run("I1").await.unwrap();

    assert_eq!(
        renderer.calls_with_prefix("instrument:"),
        vec!["instrument:page-1", "instrument:page-2"]
    );
    assert_eq!(http.instrument_calls(), vec!["GET I1", "POST I1", "POST I1"]);
    assert_eq!(store.get("I1").as_deref(), Some("ended-items"));
}

#[tokio::test]
async fn submission_carries_form_and_run_header() {
    let http = ScriptedHttp::new();
    http.on_instrument_get("I1", instrument_response("started", "<form/>"));
    http.on_instrument_post("I1", Ok(instrument_response("ended-items", "")));
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let form = its123_core::FormData::new()
        .with_field("q1", "2")
        .with_field("q2", "5");
    let submissions = QueuedSubmissions::new([form.clone()]);
    let events = EventBus::default();

    InstrumentStateMachine::new(&api, &renderer, &submissions, &events)
        .run("I1")
        .await
        .unwrap();

    let post = http
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Post)
        .unwrap();
    assert_eq!(post.form, Some(form));
    assert_eq!(post.header_value(headers::INSTRUMENT_RUN), Some("I1"));
    assert_eq!(post.header_value(headers::API_KEY), Some("test-key"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_last_error() {
    let http = ScriptedHttp::new();
    http.on_instrument_get("I1", instrument_response("in-progress", "<form/>"));
    for status in [500, 503, 500] {
        http.on_instrument_post("I1", Ok(error_response(status, "failure")));
    }
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let submissions = QueuedSubmissions::repeated(5);
    let events = EventBus::default();
    let log = EventLog::attach(&events);

    let machine = InstrumentStateMachine::new(&api, &renderer, &submissions, &events)
        .with_retry(RetryPolicy::new(3, Duration::from_millis(500)));
    let start = tokio::time::Instant::now();
    let err = machine.run("I1").await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(machine.phase(), InstrumentPhase::Failed);
    assert_eq!(http.count(Method::Post, NEXT_ITEMS_PATH), 3);
    assert_eq!(submissions.waits().len(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(1));

    let failures: Vec<_> = log
        .events()
        .into_iter()
        .filter(|e| e.kind == EventKind::InstrumentSubmitFailed)
        .collect();
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|e| e.severity == Severity::Warning));
}

#[tokio::test]
async fn closed_submission_source_is_not_retried() {
    let http = ScriptedHttp::new();
    http.on_instrument_get("I1", instrument_response("started", "<form/>"));
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let submissions = QueuedSubmissions::new([]);
    let events = EventBus::default();
    let log = EventLog::attach(&events);

    let machine = InstrumentStateMachine::new(&api, &renderer, &submissions, &events);
    let err = machine.run("I1").await.unwrap_err();

    assert!(matches!(err, ClientError::SubmissionClosed(ref code) if code == "I1"));
    assert_eq!(submissions.waits(), vec!["I1"]);
    assert_eq!(log.count(EventKind::InstrumentSubmitFailed), 0);
    assert_eq!(machine.phase(), InstrumentPhase::Failed);
}

#[tokio::test]
async fn unknown_status_after_submission_is_fatal() {
    let http = ScriptedHttp::new();
    http.on_instrument_get("I1", instrument_response("started", "<form/>"));
    http.on_instrument_post("I1", Ok(instrument_response("paused", "")));
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let submissions = QueuedSubmissions::repeated(3);
    let events = EventBus::default();
    let store = PersistentStore::new(Arc::new(MemoryBackend::new()));

    let err = InstrumentStateMachine::new(&api, &renderer, &submissions, &events)
        .with_store(Some(&store))
        .run("I1")
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Protocol(_)));
    assert_eq!(http.count(Method::Post, NEXT_ITEMS_PATH), 1);
    // the last recognised status stays cached
    assert_eq!(store.get("I1").as_deref(), Some("started"));
}

#[tokio::test]
async fn resources_load_before_render_and_init_after() {
    let http = ScriptedHttp::new();
    http.on_instrument_get(
        "I1",
        instrument_response("started", "<form/>").with_header(
            headers::RESOURCES,
            r#"{
                "jquery": {"type": "js", "path": "/jquery.js"},
                "theme": {"type": "css", "path": "/theme.css"},
                "main": {"type": "js", "path": "/main.js", "async": true, "func": "initMain"},
                "legacy": {"type": "js", "path": "/legacy.js", "func": "initLegacy"}
            }"#,
        ),
    );
    http.on_instrument_post("I1", Ok(instrument_response("ended-items", "")));
    let api = api(&http);
    let renderer = RecordingRenderer::new()
        .with_present_script("/jquery.js")
        .with_init("initMain");
    let submissions = QueuedSubmissions::repeated(1);
    let events = EventBus::default();

    InstrumentStateMachine::new(&api, &renderer, &submissions, &events)
        .run("I1")
        .await
        .unwrap();

    let calls = renderer.calls();
    let position = |call: &str| calls.iter().position(|c| c == call).unwrap();

    assert!(!calls.iter().any(|c| c == "script:/jquery.js"));
    assert!(position("script:/main.js") < position("instrument:<form/>"));
    assert!(position("script:/legacy.js") < position("instrument:<form/>"));
    assert!(position("style:/theme.css") < position("instrument:<form/>"));
    assert!(position("instrument:<form/>") < position("init:initMain"));
    assert_eq!(renderer.calls_with_prefix("init:"), vec!["init:initMain"]);
}

#[tokio::test]
async fn malformed_manifest_is_protocol_error() {
    let http = ScriptedHttp::new();
    http.on_instrument_get(
        "I1",
        instrument_response("started", "").with_header(headers::RESOURCES, "{not json"),
    );
    let api = api(&http);
    let renderer = RecordingRenderer::new();
    let submissions = QueuedSubmissions::new([]);
    let events = EventBus::default();
    let log = EventLog::attach(&events);

    let err = InstrumentStateMachine::new(&api, &renderer, &submissions, &events)
        .run("I1")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Protocol(its123_core::ProtocolError::InvalidManifest(_))
    ));
    assert!(log.names().is_empty());
}
