use brd_model::FieldValue;
use brd_sync::{InMemoryBackend, SyncConfig, SyncEngine, ToolEvent};
use brd_test_utils::{id, snapshot, step, steps};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn engine() -> (Arc<InMemoryBackend>, SyncEngine) {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed("flow", steps(&["S"]));
    let engine = SyncEngine::new(SyncConfig::default(), "flow", backend.clone()).unwrap();
    (backend, engine)
}

proptest! {
    #[test]
    fn prop_cursor_dispatches_complete_prefix(complete in prop::collection::vec(any::<bool>(), 0..12)) {
        let (_, engine) = engine();
        let mut transcript: Vec<ToolEvent> = complete
            .iter()
            .map(|done| {
                if *done {
                    ToolEvent::complete("list_signals", json!({}))
                } else {
                    ToolEvent::running("list_signals")
                }
            })
            .collect();
        let prefix = complete.iter().take_while(|done| **done).count();

        runtime().block_on(async {
            assert_eq!(engine.ingest("chat", &transcript).await.len(), prefix);

            for event in &mut transcript {
                *event = ToolEvent::complete("list_signals", json!({}));
            }
            assert_eq!(
                engine.ingest("chat", &transcript).await.len(),
                transcript.len() - prefix
            );
            assert!(engine.ingest("chat", &transcript).await.is_empty());
        });
    }

    #[test]
    fn prop_snapshot_replay_is_idempotent(goal in "[a-z ]{0,24}", title in "[A-Za-z]{1,12}") {
        let (_, engine) = engine();
        let updated = step("S")
            .with_field("goal", FieldValue::text(goal))
            .with_field("title", FieldValue::text(title));

        runtime().block_on(async {
            engine.open(&id("S")).await.unwrap();
            engine
                .handle_tool_result("update_solution_flow_step", &snapshot(&updated))
                .await;
            let once = engine.get_cached(&id("S")).unwrap();

            let second = engine
                .handle_tool_result("update_solution_flow_step", &snapshot(&updated))
                .await;

            assert!(second.changes.is_empty());
            assert_eq!(*engine.get_cached(&id("S")).unwrap(), *once);
            assert_eq!(*once, updated);
        });
    }
}
