//! TelemetryAggregator – sammelt Messwerte und bewertet die Session
//!
//! ## Nebenlaeufigkeit
//! Alle Methoden sind nicht-blockierend (kurze parking_lot-Locks, kein
//! I/O). Nur `flush()` und `dispose()` sind async und sprechen mit dem
//! Report-Ziel. Hintergrund-Tasks halten nur eine `Weak`-Referenz und
//! enden mit dem letzten Aggregator-Klon.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use voxlane_core::recorder::MetricRecorder;
use voxlane_core::types::SessionId;

use crate::buffer::SampleBuffer;
use crate::config::TelemetryConfig;
use crate::error::TelemetryResult;
use crate::probes::{standard_probes, Messung, Probe, StallDetector, SPEICHER_METRIK};
use crate::reporter::{HttpReportSink, ReportBatch, ReportSink, SystemMetrics};
use crate::sample::{PerformanceSample, VoiceMetrics, WebVital};
use crate::summary::{bewerten, Kennzahlen, PerformanceSummary};

pub const ALERT_SPRACH_LATENZ: &str = "voice.latency_alert";
pub const ALERT_SPEICHER: &str = "system.memory_alert";

/// Vollstaendiger Export (Verlauf plus Bewertung)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryExport {
    pub session_id: SessionId,
    pub exported_at: DateTime<Utc>,
    pub summary: PerformanceSummary,
    pub samples: Vec<PerformanceSample>,
}

struct Inner {
    config: TelemetryConfig,
    session_id: SessionId,
    samples: Mutex<SampleBuffer>,
    kennzahlen: Mutex<Kennzahlen>,
    probes: Mutex<Vec<Box<dyn Probe>>>,
    /// Quellen die bereits als nicht unterstuetzt gemeldet wurden
    probe_warnungen: Mutex<HashSet<&'static str>>,
    sink: Option<Arc<dyn ReportSink>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Verhindert parallele Flushes
    flush_lock: tokio::sync::Mutex<()>,
    gestartet: AtomicBool,
    freigegeben: AtomicBool,
}

/// Telemetrie einer Session, guenstig klonbar
#[derive(Clone)]
pub struct TelemetryAggregator {
    inner: Arc<Inner>,
}

impl TelemetryAggregator {
    /// Erstellt den Aggregator mit Standard-Quellen
    ///
    /// Mit `report_endpoint` wird ein HTTP-Report-Ziel angelegt.
    pub fn new(config: TelemetryConfig, session_id: SessionId) -> TelemetryResult<Self> {
        let sink = match &config.report_endpoint {
            Some(url) => Some(Arc::new(HttpReportSink::new(url.clone(), config.report_timeout())?)
                as Arc<dyn ReportSink>),
            None => None,
        };
        Self::mit_komponenten(config, session_id, sink, standard_probes())
    }

    /// Erstellt den Aggregator mit eigenem Report-Ziel und eigenen Quellen
    pub fn mit_komponenten(
        config: TelemetryConfig,
        session_id: SessionId,
        sink: Option<Arc<dyn ReportSink>>,
        probes: Vec<Box<dyn Probe>>,
    ) -> TelemetryResult<Self> {
        config.pruefen()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                session_id,
                samples: Mutex::new(SampleBuffer::new()),
                kennzahlen: Mutex::new(Kennzahlen::default()),
                probes: Mutex::new(probes),
                probe_warnungen: Mutex::new(HashSet::new()),
                sink,
                tasks: Mutex::new(Vec::new()),
                flush_lock: tokio::sync::Mutex::new(()),
                gestartet: AtomicBool::new(false),
                freigegeben: AtomicBool::new(false),
            }),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    pub fn sample_count(&self) -> usize {
        self.inner.samples.lock().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.freigegeben.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Aufzeichnung
    // -----------------------------------------------------------------------

    /// Nimmt einen Messwert auf (unterliegt dem Sampling)
    ///
    /// Die Kennzahlen der Bewertung werden unabhaengig vom Sampling
    /// aktualisiert.
    pub fn record(&self, metric: &str, value: f64, metadata: Option<Value>) {
        if self.is_disposed() {
            return;
        }
        {
            let mut k = self.inner.kennzahlen.lock();
            match metric {
                "transport.latency_ms" => k.transport_latenz_ms = Some(value),
                "audio.quality" => k.qualitaet_melden(value),
                SPEICHER_METRIK => k.speicher_mb = Some(value),
                _ => {}
            }
        }
        if !self.stichprobe() {
            return;
        }
        self.inner.samples.lock().push(PerformanceSample::neu(
            metric,
            value,
            self.inner.config.page.as_str(),
            self.inner.session_id,
            metadata,
        ));
    }

    /// Nimmt die Zeitmessungen einer Sprachrunde auf
    ///
    /// Liegt `total_latency` ueber dem Budget, wird genau ein Alert-Sample
    /// erzeugt (unabhaengig vom Sampling). Gibt zurueck ob ein Alert
    /// ausgeloest wurde.
    pub fn record_voice_metrics(&self, metrics: &VoiceMetrics) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.inner.kennzahlen.lock().voice.zusammenfuehren(metrics);
        for (name, wert) in metrics.felder() {
            self.record(name, wert, None);
        }

        let schwelle = self.inner.config.latency_threshold_ms;
        match metrics.total_latency {
            Some(latenz) if latenz > schwelle => {
                warn!(
                    session = %self.inner.session_id,
                    latenz_ms = latenz,
                    schwelle_ms = schwelle,
                    "Sprach-Latenz ueber Budget"
                );
                self.alert(
                    ALERT_SPRACH_LATENZ,
                    latenz,
                    json!({ "alert": true, "thresholdMs": schwelle, "voiceMetrics": metrics }),
                );
                true
            }
            _ => false,
        }
    }

    /// Nimmt eine vom Host gemeldete Web-Vital-Kennzahl auf
    pub fn record_web_vital(&self, vital: WebVital, value: f64) {
        if self.is_disposed() {
            return;
        }
        self.inner.kennzahlen.lock().web_vitals.setzen(vital, value);
        self.record(vital.metrik_name(), value, None);
    }

    /// Meldet einen erkannten Long Task
    pub fn record_long_task(&self, verspaetung: Duration) {
        if self.is_disposed() {
            return;
        }
        self.inner.kennzahlen.lock().long_tasks += 1;
        let ms = verspaetung.as_secs_f64() * 1000.0;
        debug!(verspaetung_ms = ms, "Long Task erkannt");
        self.record("runtime.long_task_ms", ms, None);
    }

    /// Alert-Sample, umgeht das Sampling
    fn alert(&self, metric: &str, value: f64, metadata: Value) {
        self.inner.kennzahlen.lock().alerts += 1;
        self.inner.samples.lock().push(PerformanceSample::neu(
            metric,
            value,
            self.inner.config.page.as_str(),
            self.inner.session_id,
            Some(metadata),
        ));
    }

    fn stichprobe(&self) -> bool {
        let rate = self.inner.config.sampling_rate;
        if rate >= 1.0 {
            return true;
        }
        rate > 0.0 && rand::random::<f64>() < rate
    }

    /// Fragt alle Plattform-Quellen ab
    ///
    /// Nicht unterstuetzte Quellen werden einmal als Warnung protokolliert.
    pub fn probes_messen(&self) {
        if self.is_disposed() {
            return;
        }
        let mut messungen: Vec<Messung> = Vec::new();
        {
            let mut probes = self.inner.probes.lock();
            for probe in probes.iter_mut() {
                match probe.messen() {
                    Ok(werte) => messungen.extend(werte),
                    Err(e) => {
                        if self.inner.probe_warnungen.lock().insert(probe.name()) {
                            warn!(quelle = probe.name(), fehler = %e, "Messquelle nicht verfuegbar");
                        }
                    }
                }
            }
        }

        for m in messungen {
            self.record(&m.metric, m.wert, m.metadata.clone());
            if m.metric == SPEICHER_METRIK && m.wert > self.inner.config.memory_threshold_mb {
                warn!(speicher_mb = m.wert, "Speicherverbrauch ueber Grenze");
                self.alert(
                    ALERT_SPEICHER,
                    m.wert,
                    json!({ "alert": true, "thresholdMb": self.inner.config.memory_threshold_mb }),
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Auswertung
    // -----------------------------------------------------------------------

    /// Aktuelle Bewertung mit Empfehlungen
    pub fn summary(&self) -> PerformanceSummary {
        let k = self.inner.kennzahlen.lock().clone();
        let (score, recommendations) = bewerten(&k, &self.inner.config);
        PerformanceSummary {
            session_id: self.inner.session_id,
            score,
            recommendations,
            sample_count: self.sample_count(),
            alerts: k.alerts,
            long_tasks: k.long_tasks,
            audio_quality: k.audio_qualitaet(),
            voice_metrics: k.voice,
            web_vitals: k.web_vitals,
            memory_mb: k.speicher_mb,
            transport_latency_ms: k.transport_latenz_ms,
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        self.summary().recommendations
    }

    /// Gesamter Verlauf plus Bewertung, leert den Puffer nicht
    pub fn export(&self) -> TelemetryExport {
        TelemetryExport {
            session_id: self.inner.session_id,
            exported_at: Utc::now(),
            summary: self.summary(),
            samples: self.inner.samples.lock().alle(),
        }
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Startet Quellen-Abfrage, Stall-Detektor und Reports
    ///
    /// Idempotent. Ohne laufende Tokio-Runtime wird nur gewarnt.
    pub fn start(&self) {
        if self.is_disposed() || self.inner.gestartet.swap(true, Ordering::SeqCst) {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("Keine Tokio-Runtime, Telemetrie-Tasks nicht gestartet");
            self.inner.gestartet.store(false, Ordering::SeqCst);
            return;
        }

        let cfg = &self.inner.config;
        let mut tasks = self.inner.tasks.lock();
        tasks.push(tokio::spawn(probe_schleife(
            Arc::downgrade(&self.inner),
            cfg.probe_interval(),
        )));
        tasks.push(tokio::spawn(stall_schleife(
            Arc::downgrade(&self.inner),
            StallDetector::new(cfg.stall_check_interval(), cfg.stall_threshold()),
        )));
        if self.inner.sink.is_some() {
            tasks.push(tokio::spawn(report_schleife(
                Arc::downgrade(&self.inner),
                cfg.report_interval(),
            )));
        }
        info!(session = %self.inner.session_id, reports = self.inner.sink.is_some(), "Telemetrie gestartet");
    }

    /// Versendet alle gesammelten Samples als Batch
    ///
    /// Ohne Report-Ziel passiert nichts. Bei einem Fehler werden die
    /// Samples zurueckgelegt und der Fehler zurueckgegeben.
    pub async fn flush(&self) -> TelemetryResult<usize> {
        let Some(sink) = self.inner.sink.clone() else {
            return Ok(0);
        };
        let _flush = self.inner.flush_lock.lock().await;

        let eintraege = self.inner.samples.lock().entnehmen();
        if eintraege.is_empty() {
            return Ok(0);
        }
        let anzahl = eintraege.len();
        let batch = self.batch_bauen(eintraege);

        match sink.senden(&batch).await {
            Ok(()) => {
                debug!(eintraege = anzahl, "Telemetrie-Batch versendet");
                Ok(anzahl)
            }
            Err(e) => {
                warn!(eintraege = anzahl, fehler = %e, "Report fehlgeschlagen, Batch zurueckgelegt");
                self.inner.samples.lock().wieder_einreihen(batch.entries);
                Err(e)
            }
        }
    }

    fn batch_bauen(&self, entries: Vec<PerformanceSample>) -> ReportBatch {
        let k = self.inner.kennzahlen.lock().clone();
        ReportBatch {
            session_id: self.inner.session_id,
            timestamp: Utc::now().timestamp_millis(),
            page: self.inner.config.page.clone(),
            user_agent: self.inner.config.user_agent.clone(),
            system_metrics: SystemMetrics {
                memory_mb: k.speicher_mb,
                long_tasks: k.long_tasks,
                transport_latency_ms: k.transport_latenz_ms,
                audio_quality: k.audio_qualitaet(),
            },
            web_vitals: k.web_vitals,
            voice_metrics: k.voice,
            entries,
        }
    }

    /// Beendet alle Tasks, loest die Quellen und versendet ein letztes Mal
    ///
    /// Idempotent; weitere Messwerte werden danach ignoriert.
    pub async fn dispose(&self) {
        if self.inner.freigegeben.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.probes.lock().clear();
        if let Err(e) = self.flush().await {
            warn!(fehler = %e, "Letzter Report fehlgeschlagen");
        }
        info!(session = %self.inner.session_id, "Telemetrie beendet");
    }
}

impl MetricRecorder for TelemetryAggregator {
    fn record(&self, metric: &str, value: f64, metadata: Option<Value>) {
        TelemetryAggregator::record(self, metric, value, metadata);
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

async fn probe_schleife(inner: Weak<Inner>, intervall: Duration) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        takt.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        TelemetryAggregator { inner }.probes_messen();
    }
}

async fn stall_schleife(inner: Weak<Inner>, detektor: StallDetector) {
    loop {
        let stall = detektor.takt().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Some(verspaetung) = stall {
            TelemetryAggregator { inner }.record_long_task(verspaetung);
        }
    }
}

async fn report_schleife(inner: Weak<Inner>, intervall: Duration) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Erster Tick kommt sofort
    takt.tick().await;
    loop {
        takt.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        // Fehler sind bereits protokolliert, der Batch liegt wieder im Puffer
        let _ = TelemetryAggregator { inner }.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TRIM_AUF;
    use crate::error::TelemetryError;
    use crate::probes::NoopProbe;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct TestSink {
        batches: Mutex<Vec<ReportBatch>>,
        fehlschlaege: AtomicU32,
    }

    #[async_trait]
    impl ReportSink for TestSink {
        async fn senden(&self, batch: &ReportBatch) -> TelemetryResult<()> {
            if self
                .fehlschlaege
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TelemetryError::ReportAbgelehnt("HTTP 503".into()));
            }
            self.batches.lock().push(batch.clone());
            Ok(())
        }
    }

    struct FesterSpeicher(f64);

    impl Probe for FesterSpeicher {
        fn name(&self) -> &'static str {
            "memory"
        }
        fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
            Ok(vec![Messung::neu(SPEICHER_METRIK, self.0)])
        }
    }

    struct Unverfuegbar;

    impl Probe for Unverfuegbar {
        fn name(&self) -> &'static str {
            "battery"
        }
        fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
            Err(TelemetryError::NichtUnterstuetzt("battery"))
        }
    }

    fn aggregator(config: TelemetryConfig) -> (TelemetryAggregator, Arc<TestSink>) {
        let sink = Arc::new(TestSink::default());
        let agg = TelemetryAggregator::mit_komponenten(
            config,
            SessionId::new(),
            Some(sink.clone()),
            vec![Box::new(NoopProbe::new("network"))],
        )
        .unwrap();
        (agg, sink)
    }

    fn alerts(agg: &TelemetryAggregator) -> usize {
        agg.export().samples.iter().filter(|s| s.ist_alert()).count()
    }

    #[test]
    fn latenz_ueber_budget_erzeugt_genau_einen_alert() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        let ausgeloest = agg.record_voice_metrics(&VoiceMetrics {
            speech_to_text: Some(90.0),
            text_to_speech: Some(110.0),
            total_latency: Some(250.0),
            ..Default::default()
        });
        assert!(ausgeloest);
        assert_eq!(alerts(&agg), 1);

        let summary = agg.summary();
        assert_eq!(summary.score, 80);
        assert_eq!(summary.alerts, 1);
        assert!(summary
            .recommendations
            .iter()
            .any(|r| r.contains("Sprach-Latenz")));
    }

    #[test]
    fn latenz_im_budget_ohne_alert() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        assert!(!agg.record_voice_metrics(&VoiceMetrics {
            total_latency: Some(120.0),
            ..Default::default()
        }));
        assert_eq!(alerts(&agg), 0);
        assert_eq!(agg.summary().score, 100);
    }

    #[test]
    fn alerts_umgehen_sampling() {
        let (agg, _) = aggregator(TelemetryConfig {
            sampling_rate: 0.0,
            ..Default::default()
        });
        for _ in 0..50 {
            agg.record("audio.processing_ms", 3.0, None);
        }
        assert_eq!(agg.sample_count(), 0);

        agg.record_voice_metrics(&VoiceMetrics {
            total_latency: Some(400.0),
            ..Default::default()
        });
        assert_eq!(agg.sample_count(), 1);
        assert_eq!(alerts(&agg), 1);
    }

    #[test]
    fn kennzahlen_trotz_sampling() {
        let (agg, _) = aggregator(TelemetryConfig {
            sampling_rate: 0.0,
            ..Default::default()
        });
        agg.record("transport.latency_ms", 150.0, None);
        let s = agg.summary();
        assert_eq!(s.transport_latency_ms, Some(150.0));
        assert_eq!(s.score, 90);
    }

    #[test]
    fn stille_senkt_qualitaet() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        agg.record("audio.quality", 0.0, None);
        let s = agg.summary();
        assert_eq!(s.audio_quality, Some(0.0));
        assert_eq!(s.score, 90);
    }

    #[test]
    fn puffer_wird_getrimmt() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        for i in 0..1001 {
            agg.record("audio.processing_ms", i as f64, None);
        }
        assert_eq!(agg.sample_count(), TRIM_AUF);
    }

    #[test]
    fn speicher_alert_ueber_quelle() {
        let agg = TelemetryAggregator::mit_komponenten(
            TelemetryConfig::default(),
            SessionId::new(),
            None,
            vec![Box::new(FesterSpeicher(1024.0)), Box::new(Unverfuegbar)],
        )
        .unwrap();
        agg.probes_messen();
        agg.probes_messen();

        let s = agg.summary();
        assert_eq!(s.memory_mb, Some(1024.0));
        assert_eq!(s.score, 85);
        assert_eq!(alerts(&agg), 2);
    }

    #[test]
    fn web_vitals_fliessen_in_bewertung() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        agg.record_web_vital(WebVital::Lcp, 3200.0);
        agg.record_web_vital(WebVital::Cls, 0.05);
        let s = agg.summary();
        assert_eq!(s.web_vitals.lcp, Some(3200.0));
        assert_eq!(s.score, 85);
    }

    #[test]
    fn export_ist_nicht_destruktiv() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        agg.record("audio.quality", 0.8, None);
        let export = agg.export();
        assert_eq!(export.samples.len(), 1);
        assert_eq!(export.summary.sample_count, 1);
        assert_eq!(agg.sample_count(), 1);
    }

    #[tokio::test]
    async fn fehlgeschlagener_flush_legt_zurueck() {
        let (agg, sink) = aggregator(TelemetryConfig::default());
        sink.fehlschlaege.store(1, Ordering::SeqCst);
        agg.record("audio.quality", 0.5, None);
        agg.record("audio.quality", 1.0, None);

        assert!(agg.flush().await.is_err());
        assert_eq!(agg.sample_count(), 2);

        assert_eq!(agg.flush().await.unwrap(), 2);
        assert_eq!(agg.sample_count(), 0);
        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].entries.len(), 2);
        assert_eq!(batches[0].system_metrics.audio_quality, Some(0.75));
    }

    #[tokio::test]
    async fn flush_ohne_ziel_behaelt_samples() {
        let agg = TelemetryAggregator::mit_komponenten(
            TelemetryConfig::default(),
            SessionId::new(),
            None,
            Vec::new(),
        )
        .unwrap();
        agg.record("x", 1.0, None);
        assert_eq!(agg.flush().await.unwrap(), 0);
        assert_eq!(agg.sample_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodischer_report() {
        let (agg, sink) = aggregator(TelemetryConfig {
            report_interval_ms: 1_000,
            ..Default::default()
        });
        agg.start();
        agg.start();
        agg.record("audio.quality", 0.7, None);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(sink.batches.lock().len(), 1);
        agg.dispose().await;
    }

    #[tokio::test]
    async fn dispose_sendet_letzten_batch_und_ist_idempotent() {
        let (agg, sink) = aggregator(TelemetryConfig::default());
        agg.start();
        agg.record("audio.quality", 0.7, None);

        agg.dispose().await;
        agg.dispose().await;
        assert!(agg.is_disposed());
        assert_eq!(sink.batches.lock().len(), 1);

        agg.record("audio.quality", 0.7, None);
        assert_eq!(agg.sample_count(), 0, "Nach dispose keine Aufzeichnung");
    }

    #[test]
    fn als_metric_recorder_nutzbar() {
        let (agg, _) = aggregator(TelemetryConfig::default());
        let recorder: Arc<dyn MetricRecorder> = Arc::new(agg.clone());
        recorder.record("audio.processing_ms", 4.2, None);
        assert_eq!(agg.sample_count(), 1);
    }
}
