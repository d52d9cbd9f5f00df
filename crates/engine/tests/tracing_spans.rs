//! Engine entry points open spans around the backend spans.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex};

use playstat_engine::{DomEvent, FractionKind, PlaybackBenchmark, PlaybackStatistics};
use playstat_storage::MemoryBackend;
use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, registry::LookupSpan};

#[derive(Clone, Default)]
struct SpanCollector {
    spans: Arc<Mutex<Vec<String>>>,
}

impl<S> tracing_subscriber::Layer<S> for SpanCollector
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        _attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let parent = span.parent().map(|p| p.name().to_owned()).unwrap_or_default();
            self.spans.lock().expect("lock poisoned").push(format!("{parent}>{}", span.name()));
        }
    }
}

#[tokio::test]
async fn ingest_and_query_spans_nest_backend_spans() {
    let collector = SpanCollector::default();
    let spans = Arc::clone(&collector.spans);
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(collector));

    let engine = PlaybackBenchmark::new(Arc::new(MemoryBackend::new()));
    engine
        .ingest(&PlaybackStatistics {
            id: "s".into(),
            timestamp: 0.0,
            target: "https://mybucket.s3.amazonaws.com/v/a.mp4".into(),
            events: vec![DomEvent::new(0.0, "playing")],
            device_tag: "ios".into(),
            duration: 0.0,
            playbackquality: None,
        })
        .await
        .expect("ingest");
    engine.fraction_aggregate(FractionKind::PlayableLatency, &[0]).await.expect("fraction");
    engine.histogram_aggregate("playing", &[1]).await.expect("histogram");

    let recorded = spans.lock().expect("lock poisoned");
    for expected in [
        ">ingest",
        "ingest>apply_batch",
        ">fraction_aggregate",
        "fraction_aggregate>get_items",
        ">histogram_aggregate",
        "histogram_aggregate>get_items",
    ] {
        assert!(
            recorded.iter().any(|s| s == expected),
            "missing span '{expected}', recorded: {recorded:?}"
        );
    }
}
