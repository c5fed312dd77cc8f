use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use scorebridge::bridge::{Bridge, BridgeConfig, ContainerSize, DisplayOption, PageMargins};
use scorebridge::engine::EngineCall;
use scorebridge::engine::mock::{MockEngine, Reply};
use scorebridge::error::BridgeError;
use scorebridge::events::Event;
use scorebridge::view::{LoadPhase, ScoreView, ViewConfig, ViewProps};

const SCORE: &str = "<score-partwise version=\"4.0\"/>";

fn setup_with<F>(reply: F) -> (Arc<MockEngine>, Arc<Bridge>, Arc<ScoreView>)
where
    F: Fn(&EngineCall) -> Reply + Send + Sync + 'static,
{
    let (engine, inbound) = MockEngine::with_reply(reply);
    let bridge = Arc::new(Bridge::new(engine.clone(), BridgeConfig::default()));
    bridge.listen(inbound);
    let view = ScoreView::new(Arc::clone(&bridge), ViewConfig::default());
    (engine, bridge, view)
}

fn setup() -> (Arc<MockEngine>, Arc<Bridge>, Arc<ScoreView>) {
    setup_with(|_| Reply::Succeed(json!(null)))
}

async fn until(mut condition: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}

/// Signal readiness and wait for the view's re-apply pass to finish.
async fn make_ready(engine: &MockEngine, view: &ScoreView) {
    engine.signal_ready();
    until(|| view.applied().margins.is_some()).await;
}

fn score_props() -> ViewProps {
    ViewProps {
        content: SCORE.to_string(),
        ..ViewProps::default()
    }
}

#[tokio::test(start_paused = true)]
async fn content_waits_for_readiness_then_loads() {
    let (engine, bridge, view) = setup();
    let mut events = bridge.events().subscribe();

    view.update(score_props()).await;
    assert_eq!(view.phase(), LoadPhase::Requested);
    assert_eq!(engine.dispatch_count(), 0);

    engine.signal_ready();
    until(|| view.phase() == LoadPhase::Loaded).await;

    let commands = engine.commands();
    assert_eq!(engine.count_prefixed("setOption("), DisplayOption::ALL.len());
    assert_eq!(engine.count_prefixed("setPageMargins(5.0, 5.0, 5.0, 5.0)"), 1);
    assert_eq!(engine.count_prefixed("loadScore("), 1);
    assert_eq!(engine.count_prefixed("render()"), 1);
    // Defaults need no follow-up calls.
    assert_eq!(engine.count_prefixed("setZoom"), 0);
    assert_eq!(engine.count_prefixed("setTranspose"), 0);

    let margins_at = commands.iter().position(|c| c.starts_with("setPageMargins")).unwrap();
    let load_at = commands.iter().position(|c| c.starts_with("loadScore")).unwrap();
    assert!(margins_at < load_at, "options go in before the score renders");

    let mut loaded = false;
    while let Ok(event) = events.try_recv() {
        loaded |= matches!(event, Event::ContentLoaded { .. });
    }
    assert!(loaded);
}

#[tokio::test(start_paused = true)]
async fn content_loads_immediately_when_ready() {
    let (engine, _bridge, view) = setup();
    make_ready(&engine, &view).await;

    view.update(score_props()).await;

    assert_eq!(view.phase(), LoadPhase::Loaded);
    assert_eq!(engine.count_prefixed("loadScore("), 1);
    assert_eq!(
        view.applied().content,
        Some(scorebridge::view::content_digest(SCORE))
    );
}

#[tokio::test(start_paused = true)]
async fn identical_updates_issue_no_calls() {
    let (engine, _bridge, view) = setup();
    make_ready(&engine, &view).await;
    view.update(score_props()).await;

    let before = engine.dispatch_count();
    view.update(view.props()).await;
    view.update(view.props()).await;
    view.set_zoom(1.0).await;

    assert_eq!(engine.dispatch_count(), before);
}

#[tokio::test(start_paused = true)]
async fn readiness_reapplies_everything_once() {
    let (engine, _bridge, view) = setup();

    let mut props = score_props();
    props.zoom = 1.5;
    props.transpose = 2;
    props.margins = PageMargins::uniform(10.0);
    props.display.set(DisplayOption::Title, false);
    view.update(props).await;
    assert_eq!(engine.dispatch_count(), 0);

    engine.signal_ready();
    until(|| engine.count_prefixed("setZoom") == 1).await;
    until(|| engine.count_prefixed("render()") == 2).await;

    assert_eq!(engine.count_prefixed(r#"setOption("drawTitle", false)"#), 1);
    assert_eq!(engine.count_prefixed(r#"setOption("drawComposer", true)"#), 1);
    assert_eq!(engine.count_prefixed("setPageMargins(10.0, 10.0, 10.0, 10.0)"), 1);
    assert_eq!(engine.count_prefixed("loadScore("), 1);
    assert_eq!(engine.count_prefixed("setTranspose(2)"), 1);
    assert_eq!(engine.count_prefixed("setZoom(1.5)"), 1);
    assert_eq!(view.phase(), LoadPhase::Loaded);

    // Nothing further once settled.
    let settled = engine.dispatch_count();
    tokio::time::sleep(Duration::from_millis(500)).await;
    view.update(view.props()).await;
    assert_eq!(engine.dispatch_count(), settled);
}

#[tokio::test(start_paused = true)]
async fn update_right_after_readiness_is_not_repeated() {
    let (engine, bridge, view) = setup();

    engine.signal_ready();
    bridge
        .wait_until_ready(Duration::from_secs(1))
        .await
        .unwrap();
    view.update(score_props()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(engine.count_prefixed("setOption("), DisplayOption::ALL.len());
    assert_eq!(engine.count_prefixed("setPageMargins("), 1);
    assert_eq!(engine.count_prefixed("loadScore("), 1);
    assert_eq!(engine.count_prefixed("render()"), 1);
    assert_eq!(view.phase(), LoadPhase::Loaded);
}

#[tokio::test(start_paused = true)]
async fn option_change_after_load_renders_once() {
    let (engine, _bridge, view) = setup();
    make_ready(&engine, &view).await;
    view.update(score_props()).await;
    let renders = engine.count_prefixed("render()");

    view.set_display_option(DisplayOption::PartNames, false).await;
    assert_eq!(engine.count_prefixed(r#"setOption("drawPartNames", false)"#), 1);
    assert_eq!(engine.count_prefixed("render()"), renders + 1);

    view.set_zoom(2.0).await;
    assert_eq!(engine.count_prefixed("setZoom(2.0)"), 1);
    assert_eq!(engine.count_prefixed("render()"), renders + 2);
}

#[tokio::test(start_paused = true)]
async fn zoom_waits_for_loaded_content() {
    let (engine, _bridge, view) = setup();
    make_ready(&engine, &view).await;

    view.set_zoom(2.0).await;
    assert_eq!(engine.count_prefixed("setZoom"), 0);

    view.set_content(SCORE).await;
    assert_eq!(engine.count_prefixed("setZoom(2.0)"), 1);
}

#[tokio::test(start_paused = true)]
async fn rapid_resizes_forward_only_the_last_size() {
    let (engine, _bridge, view) = setup();
    make_ready(&engine, &view).await;

    for i in 0..10 {
        view.set_container_size(ContainerSize::new(800.0 + 10.0 * i as f64, 600.0));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(engine.count_prefixed("resize("), 1);
    assert_eq!(engine.count_prefixed("resize(890.0, 600.0)"), 1);
}

#[tokio::test(start_paused = true)]
async fn small_resizes_are_ignored() {
    let (engine, _bridge, view) = setup();
    make_ready(&engine, &view).await;

    view.set_container_size(ContainerSize::new(800.0, 600.0));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.count_prefixed("resize("), 1);

    view.set_container_size(ContainerSize::new(800.5, 601.0));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.count_prefixed("resize("), 1);

    view.set_container_size(ContainerSize::new(810.0, 601.0));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.count_prefixed("resize("), 2);
}

#[tokio::test(start_paused = true)]
async fn size_set_before_ready_is_forwarded_on_ready() {
    let (engine, _bridge, view) = setup();

    view.set_container_size(ContainerSize::new(1024.0, 768.0));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.dispatch_count(), 0);

    engine.signal_ready();
    until(|| engine.count_prefixed("resize(1024.0, 768.0)") == 1).await;
}

#[tokio::test(start_paused = true)]
async fn failed_load_is_reported_and_not_retried() {
    let (engine, _bridge, view) = setup_with(|call| {
        if call.command.starts_with("loadScore") {
            Reply::Fail("not MusicXML".to_string())
        } else {
            Reply::Succeed(json!(null))
        }
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    view.set_on_error(move |e| sink.lock().unwrap().push(e.clone()));
    make_ready(&engine, &view).await;

    view.update(score_props()).await;

    let failure = BridgeError::EngineError("not MusicXML".to_string());
    assert_eq!(view.phase(), LoadPhase::Failed(failure.clone()));
    assert_eq!(*errors.lock().unwrap(), vec![failure]);

    view.update(view.props()).await;
    assert_eq!(engine.count_prefixed("loadScore("), 1);

    view.set_content("<score-partwise version=\"3.1\"/>").await;
    assert_eq!(engine.count_prefixed("loadScore("), 2);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_sent_before_readiness() {
    let (engine, _bridge, view) = setup();

    view.set_display_option(DisplayOption::Title, false).await;
    view.set_margins(PageMargins::uniform(0.0)).await;
    view.set_transpose(-5).await;

    assert_eq!(engine.dispatch_count(), 0);
    assert_eq!(view.phase(), LoadPhase::Idle);
}
