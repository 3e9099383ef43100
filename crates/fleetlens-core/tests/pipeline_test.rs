// End-to-end pipeline tests through the public Engine API: frames in,
// merged entities and broadcasts out.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

use fleetlens_core::{
    BroadcastPolicy, Engine, EngineConfig, ExtractionProfile, RawFrame, SourceRoute, SourceTag,
    Update,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn engine(policy: BroadcastPolicy) -> Engine {
    Engine::new(EngineConfig {
        routes: vec![
            SourceRoute {
                tag: SourceTag::from("ws"),
                profile: ExtractionProfile::vehicles(),
                policy,
            },
            SourceRoute {
                tag: SourceTag::from("tree"),
                profile: ExtractionProfile::vehicle_metadata(),
                policy: BroadcastPolicy::Snapshot,
            },
            SourceRoute {
                tag: SourceTag::from("sap"),
                profile: ExtractionProfile::work_orders(),
                policy: BroadcastPolicy::Entity,
            },
        ],
        ..EngineConfig::default()
    })
}

async fn push(engine: &Engine, tag: &str, text: &str) {
    engine
        .push(RawFrame::text(SourceTag::from(tag), text))
        .await
        .unwrap();
}

/// Wait until the worker has settled on the expected store version, then
/// a little longer so any broadcast has landed.
async fn settle(engine: &Engine) {
    // The intake is drained by a single worker; yielding a few times is
    // enough for the small batches in these tests.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

fn drain(rx: &mut mpsc::Receiver<Arc<Update>>) -> Vec<Arc<Update>> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        out.push(update);
    }
    out
}

// ── Scenario A: one frame, one entity, one broadcast ────────────────

#[tokio::test]
async fn single_frame_produces_one_entity_and_one_broadcast() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;
    let (_id, mut rx) = engine.subscribe();
    drain(&mut rx); // connect snapshot (empty store)

    push(
        &engine,
        "ws",
        r#"{"id":"42","plate":"34 AB 123","lat":"40.1","lng":"26.4"}"#,
    )
    .await;
    settle(&engine).await;

    let entity = engine.store().get("42").unwrap();
    assert_eq!(entity.field("plate"), Some(&json!("34 AB 123")));
    assert_eq!(entity.field("lat"), Some(&json!(40.1)));
    assert_eq!(entity.field("lng"), Some(&json!(26.4)));

    let updates = drain(&mut rx);
    assert_eq!(updates.len(), 1);
    match updates[0].as_ref() {
        Update::Snapshot(entities) => {
            assert_eq!(entities.len(), 1);
            assert_eq!(entities[0].id, "42");
        }
        Update::Entity(_) => panic!("snapshot policy expected"),
    }

    engine.shutdown().await;
}

// ── Scenario B: duplicate frame, exactly one broadcast ──────────────

#[tokio::test]
async fn identical_consecutive_frames_broadcast_once() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;
    let (_id, mut rx) = engine.subscribe();
    drain(&mut rx);

    let frame = r#"{"id":"42","lat":"40.1","lng":"26.4"}"#;
    push(&engine, "ws", frame).await;
    push(&engine, "ws", frame).await;
    settle(&engine).await;

    assert_eq!(engine.store().len(), 1);
    assert_eq!(drain(&mut rx).len(), 1, "second identical frame must be suppressed");

    engine.shutdown().await;
}

// ── Scenario C: multiplexed frame with misspelled longitude ─────────

#[tokio::test]
async fn multiplexed_event_frame_resolves_muid_and_longtitude() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;

    push(
        &engine,
        "ws",
        r#"42["VehicleLocationChanged",{"muId":"7","lat":"41.0","longtitude":"29.0"}]"#,
    )
    .await;
    settle(&engine).await;

    let entity = engine.store().get("7").unwrap();
    assert_eq!(entity.field("lat"), Some(&json!(41.0)));
    assert_eq!(entity.field("lng"), Some(&json!(29.0)));

    engine.shutdown().await;
}

// ── Scenario D: heartbeat frames are inert ──────────────────────────

#[tokio::test]
async fn heartbeat_frame_produces_nothing() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;
    let (_id, mut rx) = engine.subscribe();
    drain(&mut rx);

    push(&engine, "ws", "2").await;
    push(&engine, "ws", "3probe").await;
    settle(&engine).await;

    assert!(engine.store().is_empty());
    assert!(drain(&mut rx).is_empty());

    engine.shutdown().await;
}

// ── Enterprise OData envelope with double-encoded work list ─────────

#[tokio::test]
async fn odata_envelope_merges_and_broadcasts_work_orders() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;
    let (_id, mut rx) = engine.subscribe();
    drain(&mut rx);

    // `d.results` rows carry the work list as a JSON string in `Zvalue`.
    push(
        &engine,
        "sap",
        r#"{"d":{"results":[{"Zkey":"LIST_YOL","Zvalue":"[{\"ustIsEmri\":\"WO-1\",\"orderid\":\"4000123\",\"werks\":\"5221\"}]"}]}}"#,
    )
    .await;
    settle(&engine).await;

    let entity = engine.store().get("WO-1").unwrap();
    assert_eq!(entity.field("orderid"), Some(&json!("4000123")));
    assert_eq!(entity.field("werks"), Some(&json!("5221")));

    let updates = drain(&mut rx);
    assert_eq!(updates.len(), 1);
    assert!(matches!(updates[0].as_ref(), Update::Entity(_)));

    engine.shutdown().await;
}

// ── Field preservation across sources ───────────────────────────────

#[tokio::test]
async fn later_partial_update_preserves_known_fields() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;

    // Metadata from the tree endpoint first, then a location update that
    // omits the plate. The plate must survive.
    push(&engine, "tree", r#"{"items":[{"id":"42","plate":"34 AB 123"}]}"#).await;
    push(&engine, "ws", r#"{"id":"42","lat":"40.1","lng":"26.4","speed":10}"#).await;
    settle(&engine).await;

    let entity = engine.store().get("42").unwrap();
    assert_eq!(entity.field("plate"), Some(&json!("34 AB 123")));
    assert_eq!(entity.field("lat"), Some(&json!(40.1)));
    assert_eq!(entity.field("speed"), Some(&json!(10)));
    assert_eq!(engine.store().len(), 1);

    engine.shutdown().await;
}

// ── Identity priority ───────────────────────────────────────────────

#[tokio::test]
async fn earlier_identity_alias_wins() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;

    push(&engine, "ws", r#"{"id":"X","plaka":"Y","lat":1.0,"lng":2.0}"#).await;
    settle(&engine).await;

    assert!(engine.store().get("X").is_some());
    assert!(engine.store().get("Y").is_none());

    engine.shutdown().await;
}

// ── Case-insensitive aliases end to end ─────────────────────────────

#[tokio::test]
async fn capitalized_geo_aliases_resolve_identically() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;

    push(&engine, "ws", r#"{"id":"A","Latitude":40.1,"Longitude":26.4}"#).await;
    push(&engine, "ws", r#"{"id":"B","lat":40.1,"lng":26.4}"#).await;
    settle(&engine).await;

    let a = engine.store().get("A").unwrap();
    let b = engine.store().get("B").unwrap();
    assert_eq!(a.field("lat"), b.field("lat"));
    assert_eq!(a.field("lng"), b.field("lng"));

    engine.shutdown().await;
}

// ── Entity policy: each changed entity published on its own ─────────

#[tokio::test]
async fn entity_policy_publishes_per_entity() {
    let engine = engine(BroadcastPolicy::Entity);
    engine.start().await;
    let (_id, mut rx) = engine.subscribe();
    drain(&mut rx);

    push(
        &engine,
        "ws",
        r#"[{"id":"1","lat":1.0,"lng":2.0},{"id":"2","lat":3.0,"lng":4.0}]"#,
    )
    .await;
    settle(&engine).await;

    let updates = drain(&mut rx);
    assert_eq!(updates.len(), 2);
    assert!(updates
        .iter()
        .all(|u| matches!(u.as_ref(), Update::Entity(_))));

    engine.shutdown().await;
}

// ── Late subscriber replay ──────────────────────────────────────────

#[tokio::test]
async fn late_subscriber_receives_full_snapshot_on_connect() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;

    push(&engine, "ws", r#"{"id":"1","lat":1.0,"lng":2.0}"#).await;
    push(&engine, "ws", r#"{"id":"2","lat":3.0,"lng":4.0}"#).await;
    settle(&engine).await;

    let (_id, mut rx) = engine.subscribe();
    let first = rx.recv().await.unwrap();
    match first.as_ref() {
        Update::Snapshot(entities) => assert_eq!(entities.len(), 2),
        Update::Entity(_) => panic!("expected snapshot replay on connect"),
    }

    engine.shutdown().await;
}

// ── Malformed input never halts ingestion ───────────────────────────

#[tokio::test]
async fn malformed_frames_do_not_stop_the_pipeline() {
    let engine = engine(BroadcastPolicy::Snapshot);
    engine.start().await;

    push(&engine, "ws", "not json at all").await;
    push(&engine, "ws", r#"{"broken": "#).await;
    push(&engine, "ws", r#"{"lat":1.0,"lng":2.0}"#).await; // unresolved identity
    push(&engine, "ws", r#"{"id":"ok","lat":1.0,"lng":2.0}"#).await;
    settle(&engine).await;

    assert_eq!(engine.store().len(), 1);
    assert!(engine.store().get("ok").is_some());

    engine.shutdown().await;
}
