//! End-to-end ingestion and query scenarios over the in-memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{collections::BTreeMap, sync::Arc};

use playstat_engine::{
    DomEvent, EngineError, FractionKind, PlaybackBenchmark, PlaybackQualitySample,
    PlaybackStatistics,
};
use playstat_storage::{MemoryBackend, StorageBackend};

// ============================================================================
// Fixtures
// ============================================================================

const SHORT_MP4: &str = "https://mybucket.s3.amazonaws.com/videos/short.mp4";

fn session(id: &str, device: &str, target: &str, events: &[(f64, &str)]) -> PlaybackStatistics {
    PlaybackStatistics {
        id: id.to_owned(),
        timestamp: 1_700_000_000.0,
        target: target.to_owned(),
        events: events.iter().map(|&(ts, kind)| DomEvent::new(ts, kind)).collect(),
        device_tag: device.to_owned(),
        duration: 0.0,
        playbackquality: None,
    }
}

fn engine() -> PlaybackBenchmark {
    PlaybackBenchmark::new(Arc::new(MemoryBackend::new()))
}

// ============================================================================
// Fraction aggregates
// ============================================================================

#[tokio::test]
async fn latency_grouped_by_device() {
    let engine = engine();
    let load = [(0.0, "loadstart"), (5.0, "loadeddata")];
    engine.ingest(&session("a", "android", SHORT_MP4, &load)).await.unwrap();
    engine.ingest(&session("b", "ios", SHORT_MP4, &load)).await.unwrap();

    let latency = engine.fraction_aggregate(FractionKind::PlayableLatency, &[1]).await.unwrap();
    assert_eq!(latency, BTreeMap::from([("android".into(), 5.0), ("ios".into(), 5.0)]));
}

#[tokio::test]
async fn latency_is_mean_across_sessions() {
    let engine = engine();
    let fast = [(1.0, "loadstart"), (3.0, "loadeddata")];
    let slow = [(2.0, "loadstart"), (8.0, "loadeddata")];
    engine.ingest(&session("a", "tv", SHORT_MP4, &fast)).await.unwrap();
    engine.ingest(&session("b", "tv", SHORT_MP4, &slow)).await.unwrap();
    engine.ingest(&session("c", "tv", SHORT_MP4, &[(2.0, "loadstart")])).await.unwrap();

    let latency = engine.fraction_aggregate(FractionKind::PlayableLatency, &[0]).await.unwrap();
    assert_eq!(latency, BTreeMap::from([("S3".into(), 4.0)]));
}

#[tokio::test]
async fn playback_duration_keeps_millisecond_scaling() {
    // The reported duration is multiplied by 1000 before summing while the
    // event delta is summed as-is; the ratio reflects exactly that.
    let engine = engine();
    let mut record = session("a", "ios", SHORT_MP4, &[(10.0, "playing"), (40.0, "ended")]);
    record.duration = 60.0;
    engine.ingest(&record).await.unwrap();

    let stored = engine.list_all().await.unwrap();
    assert_eq!(stored.get("AGGRADURATION_VS:S3:ios:short.mp4").map(String::as_str), Some("60000"));
    assert_eq!(stored.get("AGGRADURATION_AS:S3:ios:short.mp4").map(String::as_str), Some("30"));

    let ratio = engine.fraction_aggregate(FractionKind::PlaybackDuration, &[1]).await.unwrap();
    assert_eq!(ratio, BTreeMap::from([("ios".into(), 30.0 / 60000.0)]));
}

#[tokio::test]
async fn empty_store_yields_empty_fraction() {
    let engine = engine();
    for kind in [FractionKind::PlayableLatency, FractionKind::PlaybackDuration] {
        assert!(engine.fraction_aggregate(kind, &[0]).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn out_of_range_node_is_a_client_error() {
    let engine = engine();
    engine
        .ingest(&session("a", "ios", SHORT_MP4, &[(0.0, "loadstart"), (1.0, "loadeddata")]))
        .await
        .unwrap();

    let err = engine.fraction_aggregate(FractionKind::PlayableLatency, &[9]).await.unwrap_err();
    assert!(matches!(err, EngineError::IndexOutOfRange { index: 9, .. }), "got: {err:?}");
    assert!(err.is_client_error());

    let err = engine.histogram_aggregate("loadstart", &[9]).await.unwrap_err();
    assert!(matches!(err, EngineError::IndexOutOfRange { index: 9, .. }));
}

// ============================================================================
// Histograms
// ============================================================================

#[tokio::test]
async fn sessions_of_same_video_accumulate() {
    let engine = engine();
    engine.ingest(&session("one", "ios", SHORT_MP4, &[(0.0, "playing")])).await.unwrap();
    engine.ingest(&session("two", "ios", SHORT_MP4, &[(0.0, "playing")])).await.unwrap();

    let counts = engine.histogram_aggregate("playing", &[0, 1, 2]).await.unwrap();
    assert_eq!(counts, BTreeMap::from([("S3:ios:short.mp4".into(), 2)]));
}

#[tokio::test]
async fn histogram_separates_origins() {
    let engine = engine();
    let events = [(0.0, "pause"), (1.0, "pause")];
    engine.ingest(&session("a", "ios", SHORT_MP4, &events)).await.unwrap();
    engine
        .ingest(&session("b", "ios", "https://d1.cloudfront.net/videos/short.mp4", &events))
        .await
        .unwrap();
    engine
        .ingest(&session("c", "ios", "https://cdn.example.org/short.mp4", &events))
        .await
        .unwrap();

    let counts = engine.histogram_aggregate("pause", &[0]).await.unwrap();
    assert_eq!(
        counts,
        BTreeMap::from([("CloudFront".into(), 2), ("Edge".into(), 2), ("S3".into(), 2)])
    );
    assert_eq!(engine.histogram_aggregate("pause", &[2]).await.unwrap().get("short.mp4"), Some(&6));
}

#[tokio::test]
async fn event_type_with_separator_is_rejected_and_leaves_histograms_clean() {
    let engine = engine();
    engine.ingest(&session("a", "ios", SHORT_MP4, &[(0.0, "play")])).await.unwrap();

    let err = engine.ingest(&session("b", "ios", SHORT_MP4, &[(0.0, "play:x")])).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRecord(_)), "got: {err:?}");

    let counts = engine.histogram_aggregate("play", &[0]).await.unwrap();
    assert_eq!(counts, BTreeMap::from([("S3".into(), 1)]));
    assert_eq!(engine.list_raw().await.unwrap().len(), 1);
}

// ============================================================================
// Raw records
// ============================================================================

#[tokio::test]
async fn raw_records_round_trip() {
    let engine = engine();
    let mut record = session("rt", "android", SHORT_MP4, &[(0.0, "loadstart"), (0.5, "playing")]);
    record.duration = 12.25;
    record.playbackquality = Some(PlaybackQualitySample {
        samples: 1,
        creation_times: vec![0.25],
        dropped_video_frames: vec![0],
        total_video_frames: vec![24],
    });
    engine.ingest(&record).await.unwrap();

    assert_eq!(engine.list_raw().await.unwrap(), vec![record]);
    assert!(engine.backend().contains("ORGE:S3:android:short.mp4:rt").await.unwrap());
}

#[tokio::test]
async fn reingesting_a_session_overwrites_record_but_accumulates_counters() {
    let engine = engine();
    let record = session("dup", "ios", SHORT_MP4, &[(0.0, "playing")]);
    engine.ingest(&record).await.unwrap();
    engine.ingest(&record).await.unwrap();

    assert_eq!(engine.list_raw().await.unwrap().len(), 1);
    assert_eq!(engine.histogram_aggregate("playing", &[1]).await.unwrap().get("ios"), Some(&2));
}

#[tokio::test]
async fn list_all_is_text_throughout() {
    let engine = engine();
    engine
        .ingest(&session("a", "ios", SHORT_MP4, &[(0.0, "loadstart"), (2.0, "loadeddata")]))
        .await
        .unwrap();

    let all = engine.list_all().await.unwrap();
    assert_eq!(
        all.keys().map(String::as_str).collect::<Vec<_>>(),
        vec![
            "AGGRHIST:loadeddata:S3:ios:short.mp4",
            "AGGRHIST:loadstart:S3:ios:short.mp4",
            "AGGRTPLAYABLE_C:S3:ios:short.mp4",
            "AGGRTPLAYABLE_S:S3:ios:short.mp4",
            "ORGE:S3:ios:short.mp4:a",
        ]
    );
    assert_eq!(all["AGGRTPLAYABLE_S:S3:ios:short.mp4"], "2");
}

#[tokio::test]
async fn corrupted_raw_record_is_reported() {
    let engine = engine();
    engine.backend().set("ORGE:S3:ios:x:1".to_owned(), "not json".to_owned()).await.unwrap();
    assert!(matches!(engine.list_raw().await, Err(EngineError::Serialization(_))));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_ingestion_loses_no_updates() {
    let engine = engine();
    let sessions = 64;

    let handles: Vec<_> = (0..sessions)
        .map(|i| {
            let engine = engine.clone();
            let device = if i % 2 == 0 { "ios" } else { "android" };
            let record = session(
                &format!("s{i}"),
                device,
                SHORT_MP4,
                &[(0.0, "loadstart"), (2.0, "loadeddata"), (3.0, "playing")],
            );
            tokio::spawn(async move { engine.ingest(&record).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let counts = engine.histogram_aggregate("playing", &[1]).await.unwrap();
    assert_eq!(counts, BTreeMap::from([("android".into(), 32), ("ios".into(), 32)]));
    let latency = engine.fraction_aggregate(FractionKind::PlayableLatency, &[0]).await.unwrap();
    assert_eq!(latency, BTreeMap::from([("S3".into(), 2.0)]));
    assert_eq!(engine.list_raw().await.unwrap().len(), sessions);
}
