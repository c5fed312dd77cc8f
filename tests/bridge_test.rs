use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use scorebridge::bridge::{Bridge, BridgeConfig, ContainerSize, DisplayOption, Parameter};
use scorebridge::engine::Inbound;
use scorebridge::engine::mock::{MockEngine, Reply};
use scorebridge::error::BridgeError;
use scorebridge::events::Event;
use scorebridge::protocol::EngineMessage;

fn config(timeout: Duration) -> BridgeConfig {
    BridgeConfig {
        timeout,
        ..BridgeConfig::default()
    }
}

/// A bridge pumping `inbound`, not yet ready.
fn bridge_for(engine: &Arc<MockEngine>, inbound: Inbound, timeout: Duration) -> Arc<Bridge> {
    let bridge = Arc::new(Bridge::new(engine.clone(), config(timeout)));
    bridge.listen(inbound);
    bridge
}

/// A bridge whose engine has signalled readiness.
async fn ready_bridge(engine: &Arc<MockEngine>, inbound: Inbound) -> Arc<Bridge> {
    let bridge = bridge_for(engine, inbound, Duration::from_secs(10));
    engine.signal_ready();
    bridge
        .wait_until_ready(Duration::from_secs(1))
        .await
        .unwrap();
    bridge
}

async fn until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn calls_before_ready_fail_without_dispatch() {
    let (engine, inbound) = MockEngine::new();
    let bridge = bridge_for(&engine, inbound, Duration::from_secs(10));

    assert_eq!(bridge.call("render()").await, Err(BridgeError::NotReady));
    assert_eq!(bridge.load_content("<score/>").await, Err(BridgeError::NotReady));
    assert_eq!(bridge.render().await, Err(BridgeError::NotReady));
    assert_eq!(bridge.set_zoom(1.5).await, Err(BridgeError::NotReady));
    assert_eq!(
        bridge
            .set_display_option(DisplayOption::Title, false)
            .await,
        Err(BridgeError::NotReady)
    );

    assert_eq!(engine.dispatch_count(), 0);
    assert_eq!(bridge.stats().issued, 0);
    assert!(!bridge.is_ready());
}

#[tokio::test]
async fn success_resolves_with_engine_payload() {
    let (engine, inbound) = MockEngine::with_reply(|call| {
        if call.command == "getLayout()" {
            Reply::Succeed(json!({"width": 800, "height": 1131}))
        } else {
            Reply::Succeed(json!(null))
        }
    });
    let bridge = ready_bridge(&engine, inbound).await;

    let layout = bridge.query_layout().await.unwrap();
    assert_eq!(layout, json!({"width": 800, "height": 1131}));
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.stats().succeeded, 1);
}

#[tokio::test]
async fn dispatched_script_is_wrapped_with_its_id() {
    let (engine, inbound) = MockEngine::new();
    let bridge = ready_bridge(&engine, inbound).await;

    bridge.render().await.unwrap();

    let call = engine.calls().pop().unwrap();
    assert_eq!(call.command, "render()");
    assert!(call.script.contains(&format!("operationId: {}", call.id)));
    assert!(call.script.contains("bridge.postMessage"));
}

#[tokio::test]
async fn engine_error_is_returned_and_bridge_stays_usable() {
    let (engine, inbound) = MockEngine::with_reply(|_| Reply::Fail("invalid MusicXML".to_string()));
    let bridge = ready_bridge(&engine, inbound).await;

    let err = bridge.load_content("<not-a-score/>").await.unwrap_err();
    assert_eq!(err, BridgeError::EngineError("invalid MusicXML".to_string()));
    assert_eq!(bridge.last_failure(), Some(err));
    assert!(!bridge.is_operation_in_flight());

    engine.respond_with(|_| Reply::Succeed(json!(null)));
    bridge.load_content("<score-partwise/>").await.unwrap();
    bridge.render().await.unwrap();
    assert_eq!(bridge.stats().failed, 1);
    assert_eq!(bridge.stats().succeeded, 2);
}

#[tokio::test]
async fn dispatch_failure_clears_registration() {
    let (engine, inbound) = MockEngine::with_reply(|_| Reply::Reject("webview gone".to_string()));
    let bridge = ready_bridge(&engine, inbound).await;

    let err = bridge.render().await.unwrap_err();
    assert!(matches!(err, BridgeError::DispatchFailure(ref m) if m.contains("webview gone")));
    assert_eq!(bridge.pending_count(), 0);

    engine.respond_with(|_| Reply::Succeed(json!(null)));
    assert!(bridge.render().await.is_ok());
}

#[tokio::test]
async fn ids_increase_and_out_of_order_responses_reach_their_callers() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = ready_bridge(&engine, inbound).await;

    let spawn_call = |command: &'static str| {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.call(command).await })
    };
    let a = spawn_call("a()");
    let b = spawn_call("b()");
    let c = spawn_call("c()");

    until(|| engine.dispatch_count() == 3).await;
    let calls = engine.calls();
    assert!(calls.windows(2).all(|w| w[0].id < w[1].id));

    // Answer in reverse issue order, echoing each command back.
    for call in calls.iter().rev() {
        let resolved = bridge.handle_message(EngineMessage::Success {
            operation_id: call.id,
            result: json!(call.command),
        });
        assert!(resolved);
    }

    assert_eq!(a.await.unwrap().unwrap(), json!("a()"));
    assert_eq!(b.await.unwrap().unwrap(), json!("b()"));
    assert_eq!(c.await.unwrap().unwrap(), json!("c()"));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_engine_times_out_and_forgets_the_call() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = bridge_for(&engine, inbound, Duration::from_secs(10));
    engine.signal_ready();
    until(|| bridge.is_ready()).await;

    let start = tokio::time::Instant::now();
    let err = bridge.render().await.unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err, BridgeError::Timeout(Duration::from_secs(10)));
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_millis(10_100));

    let id = engine.calls()[0].id;
    assert!(!bridge.is_pending(id));
    assert_eq!(bridge.pending_count(), 0);
    assert_eq!(bridge.stats().timed_out, 1);

    // A late answer is ignored.
    assert!(!bridge.handle_message(EngineMessage::Success {
        operation_id: id,
        result: json!(null),
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timeout_and_late_response_resolve_exactly_once() {
    for i in 0..200u64 {
        let (engine, _inbound) = MockEngine::silent();
        let bridge = Arc::new(Bridge::new(engine.clone(), config(Duration::from_millis(2))));
        bridge.handle_message(EngineMessage::Ready);

        let call = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.call("render()").await })
        };
        while engine.dispatch_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = engine.calls()[0].id;

        let delay = Duration::from_micros((i * 37) % 4_000);
        let deliver = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                bridge.handle_message(EngineMessage::Success {
                    operation_id: id,
                    result: json!(i),
                })
            })
        };

        let result = call.await.unwrap();
        let delivered = deliver.await.unwrap();
        match result {
            Ok(value) => {
                assert!(delivered, "iteration {i}: success without delivery");
                assert_eq!(value, json!(i));
            }
            Err(BridgeError::Timeout(_)) => {
                assert!(!delivered, "iteration {i}: delivered after timeout won");
            }
            Err(other) => panic!("iteration {i}: unexpected {other}"),
        }
        assert_eq!(bridge.pending_count(), 0);
    }
}

#[tokio::test]
async fn readiness_fires_once() {
    let (engine, _inbound) = MockEngine::new();
    let bridge = Bridge::new(engine, BridgeConfig::default());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    bridge.set_on_ready(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut events = bridge.events().subscribe();

    bridge.handle_message(EngineMessage::Ready);
    bridge.handle_message(EngineMessage::Ready);

    assert!(bridge.is_ready());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(events.try_recv().unwrap(), Event::EngineReady);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn spontaneous_error_goes_to_listener_not_to_calls() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = ready_bridge(&engine, inbound).await;
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge.set_on_error(move |e| sink.lock().unwrap().push(e.clone()));

    let pending = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.render().await })
    };
    until(|| engine.dispatch_count() == 1).await;

    engine.send(EngineMessage::Error {
        operation_id: None,
        error: "Cannot read properties of undefined".to_string(),
    });
    until(|| !seen.lock().unwrap().is_empty()).await;

    assert_eq!(
        seen.lock().unwrap()[0],
        BridgeError::EngineError("Cannot read properties of undefined".to_string())
    );
    assert_eq!(bridge.pending_count(), 1);

    let id = engine.calls()[0].id;
    engine.send(EngineMessage::Success {
        operation_id: id,
        result: json!(null),
    });
    assert!(pending.await.unwrap().is_ok());
}

#[tokio::test]
async fn repeated_zoom_dispatches_once() {
    let (engine, inbound) = MockEngine::new();
    let bridge = ready_bridge(&engine, inbound).await;

    bridge.set_parameter(Parameter::Zoom(1.5)).await.unwrap();
    bridge.set_parameter(Parameter::Zoom(1.5)).await.unwrap();

    assert_eq!(engine.count_prefixed("setZoom"), 1);
    assert_eq!(engine.commands(), vec!["setZoom(1.5)".to_string()]);
}

#[tokio::test]
async fn concurrent_repeats_dispatch_once() {
    let (engine, inbound) = MockEngine::new();
    let bridge = ready_bridge(&engine, inbound).await;

    let (a, b) = tokio::join!(bridge.set_zoom(1.5), bridge.set_zoom(1.5));
    assert!(a.is_ok() && b.is_ok());
    let (a, b) = tokio::join!(bridge.set_transpose(-2), bridge.set_transpose(-2));
    assert!(a.is_ok() && b.is_ok());

    assert_eq!(engine.count_prefixed("setZoom"), 1);
    assert_eq!(engine.count_prefixed("setTranspose"), 1);
}

#[tokio::test]
async fn failed_zoom_can_be_retried() {
    let (engine, inbound) = MockEngine::with_reply(|_| Reply::Fail("no score".to_string()));
    let bridge = ready_bridge(&engine, inbound).await;

    assert!(bridge.set_zoom(1.5).await.is_err());
    assert!(bridge.set_transpose(4).await.is_err());

    engine.respond_with(|_| Reply::Succeed(json!(null)));
    bridge.set_zoom(1.5).await.unwrap();
    bridge.set_transpose(4).await.unwrap();
    bridge.set_zoom(1.5).await.unwrap();

    assert_eq!(engine.count_prefixed("setZoom(1.5)"), 2);
    assert_eq!(engine.count_prefixed("setTranspose(4)"), 2);
}

#[tokio::test]
async fn zoom_out_of_range_is_rejected_before_dispatch() {
    let (engine, inbound) = MockEngine::new();
    let bridge = ready_bridge(&engine, inbound).await;

    assert!(matches!(
        bridge.set_parameter(Parameter::Zoom(0.05)).await,
        Err(BridgeError::InvalidParameter(_))
    ));
    assert!(matches!(
        bridge.set_parameter(Parameter::Zoom(7.0)).await,
        Err(BridgeError::InvalidParameter(_))
    ));
    assert_eq!(engine.dispatch_count(), 0);

    assert!(bridge.set_parameter(Parameter::Zoom(1.0)).await.is_ok());
    assert!(bridge.set_parameter(Parameter::Zoom(2.0)).await.is_ok());
    assert_eq!(engine.count_prefixed("setZoom"), 1);
}

#[tokio::test]
async fn other_parameters_are_validated() {
    let (engine, inbound) = MockEngine::new();
    let bridge = ready_bridge(&engine, inbound).await;

    assert!(bridge.set_transpose(30).await.is_err());
    assert!(
        bridge
            .update_container_size(ContainerSize::new(0.0, 600.0))
            .await
            .is_err()
    );
    assert!(bridge.load_content("   ").await.is_err());
    assert_eq!(engine.dispatch_count(), 0);

    bridge
        .update_container_size(ContainerSize::new(800.0, 600.0))
        .await
        .unwrap();
    assert_eq!(engine.commands(), vec!["resize(800.0, 600.0)".to_string()]);
}

#[tokio::test]
async fn loading_resets_zoom_and_transpose() {
    let (engine, inbound) = MockEngine::new();
    let bridge = ready_bridge(&engine, inbound).await;

    bridge.set_zoom(2.0).await.unwrap();
    bridge.set_transpose(3).await.unwrap();
    bridge.load_content("<score-partwise/>").await.unwrap();
    bridge.set_zoom(2.0).await.unwrap();
    bridge.set_transpose(3).await.unwrap();

    assert_eq!(engine.count_prefixed("setZoom"), 2);
    assert_eq!(engine.count_prefixed("setTranspose"), 2);
}

#[tokio::test]
async fn in_flight_flag_tracks_load_render_cycles() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = ready_bridge(&engine, inbound).await;
    let mut events = bridge.events().subscribe();

    let render = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.render().await })
    };
    until(|| engine.dispatch_count() == 1).await;
    assert!(bridge.is_operation_in_flight());

    engine.send(EngineMessage::Success {
        operation_id: engine.calls()[0].id,
        result: json!(null),
    });
    render.await.unwrap().unwrap();

    assert!(!bridge.is_operation_in_flight());
    assert_eq!(
        events.recv().await.unwrap(),
        Event::InFlightChanged { in_flight: true }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        Event::InFlightChanged { in_flight: false }
    );
}

#[tokio::test]
async fn raw_messages_are_parsed_and_routed() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = ready_bridge(&engine, inbound).await;

    assert!(!bridge.handle_raw("{garbage"));
    assert!(!bridge.handle_raw(r#"{"type":"log","level":"warn","message":"slow"}"#));

    let call = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.call("osmd.Sheet.Title.text").await })
    };
    until(|| engine.dispatch_count() == 1).await;
    let id = engine.calls()[0].id;

    assert!(bridge.handle_raw(&format!(
        r#"{{"type":"success","operationId":{id},"result":"Prelude"}}"#
    )));
    assert_eq!(call.await.unwrap().unwrap(), json!("Prelude"));
}

#[tokio::test]
async fn disconnect_fails_pending_calls() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = ready_bridge(&engine, inbound).await;

    let call = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move { bridge.render().await })
    };
    until(|| bridge.pending_count() == 1).await;

    bridge.disconnect();

    assert_eq!(
        call.await.unwrap(),
        Err(BridgeError::DispatchFailure("engine disconnected".to_string()))
    );
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn abandoned_call_releases_its_registration() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = ready_bridge(&engine, inbound).await;

    let abandoned = tokio::time::timeout(Duration::from_millis(5), bridge.call("render()")).await;
    assert!(abandoned.is_err());
    assert_eq!(engine.dispatch_count(), 1);
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_until_ready_gives_up() {
    let (engine, inbound) = MockEngine::silent();
    let bridge = bridge_for(&engine, inbound, Duration::from_secs(10));

    assert_eq!(
        bridge.wait_until_ready(Duration::from_secs(2)).await,
        Err(BridgeError::Timeout(Duration::from_secs(2)))
    );
}
