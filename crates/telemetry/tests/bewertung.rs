//! Szenarien ueber die oeffentliche Schnittstelle des Aggregators

use std::sync::Arc;
use voxlane_core::{MetricRecorder, SessionId};
use voxlane_telemetry::{
    NoopProbe, TelemetryAggregator, TelemetryConfig, VoiceMetrics, WebVital,
};

fn aggregator() -> TelemetryAggregator {
    TelemetryAggregator::mit_komponenten(
        TelemetryConfig::default(),
        SessionId::new(),
        None,
        vec![Box::new(NoopProbe::new("battery"))],
    )
    .unwrap()
}

#[test]
fn sprachrunde_mit_250ms_gegen_budget_180ms() {
    let agg = aggregator();
    let vorher = agg.summary().score;

    agg.record_voice_metrics(&VoiceMetrics {
        speech_to_text: Some(100.0),
        text_to_speech: Some(100.0),
        processing: Some(50.0),
        total_latency: Some(250.0),
        ..Default::default()
    });

    let export = agg.export();
    let alerts: Vec<_> = export.samples.iter().filter(|s| s.ist_alert()).collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].value, 250.0);

    assert_eq!(vorher - export.summary.score, 20);
    assert_eq!(export.summary.recommendations.len(), 1);
}

#[test]
fn komponenten_melden_ueber_recorder() {
    let agg = aggregator();
    let recorder: Arc<dyn MetricRecorder> = Arc::new(agg.clone());

    // Conditioner und Transport kennen nur das Trait
    recorder.record("audio.processing_ms", 2.5, None);
    recorder.record("audio.quality", 0.9, None);
    recorder.record("transport.latency_ms", 40.0, None);
    agg.record_web_vital(WebVital::Fid, 20.0);

    let s = agg.summary();
    assert_eq!(s.score, 100);
    assert_eq!(s.sample_count, 4);
    assert_eq!(s.transport_latency_ms, Some(40.0));

    let json = serde_json::to_value(agg.export()).unwrap();
    assert_eq!(json["summary"]["score"], 100);
    assert_eq!(json["samples"].as_array().map(Vec::len), Some(4));
}
