//! Plattform-Messquellen
//!
//! Jede Quelle ist ein `Probe`-Trait-Objekt. Nicht unterstuetzte Quellen
//! liefern einen Fehler, der Aggregator protokolliert ihn einmal als
//! Warnung und macht weiter. `NoopProbe` ersetzt Quellen, die bewusst
//! abgeschaltet sind.

use serde_json::{json, Value};
use std::time::Duration;
use sysinfo::{Networks, Pid, ProcessesToUpdate, System};

use crate::error::{TelemetryError, TelemetryResult};

/// Metrikname der Speicher-Messung
pub const SPEICHER_METRIK: &str = "system.memory_mb";

/// Metrikname der Netzwerk-Momentaufnahme (Anzahl aktiver Schnittstellen)
pub const NETZWERK_METRIK: &str = "system.network_interfaces";

/// Metrikname des Akku-Ladestands in Prozent
pub const AKKU_METRIK: &str = "system.battery_percent";

/// Ein Messwert einer Quelle
#[derive(Debug, Clone, PartialEq)]
pub struct Messung {
    pub metric: String,
    pub wert: f64,
    pub metadata: Option<Value>,
}

impl Messung {
    pub fn neu(metric: impl Into<String>, wert: f64) -> Self {
        Self {
            metric: metric.into(),
            wert,
            metadata: None,
        }
    }

    pub fn mit_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Plattform-Messquelle (best effort)
pub trait Probe: Send {
    fn name(&self) -> &'static str;

    /// Nimmt eine Momentaufnahme auf
    fn messen(&mut self) -> TelemetryResult<Vec<Messung>>;
}

// ---------------------------------------------------------------------------
// NoopProbe
// ---------------------------------------------------------------------------

/// Quelle ohne Messwerte
#[derive(Debug, Clone, Copy)]
pub struct NoopProbe {
    name: &'static str,
}

impl NoopProbe {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl Probe for NoopProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// MemoryProbe
// ---------------------------------------------------------------------------

/// Speicherbelegung des eigenen Prozesses via sysinfo
pub struct MemoryProbe {
    system: System,
    pid: Option<Pid>,
}

impl MemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for MemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for MemoryProbe {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
        let pid = self.pid.ok_or(TelemetryError::NichtUnterstuetzt("memory"))?;
        self.system.refresh_memory();
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let prozess = self
            .system
            .process(pid)
            .ok_or(TelemetryError::NichtUnterstuetzt("memory"))?;

        let mb = |bytes: u64| bytes as f64 / (1024.0 * 1024.0);
        Ok(vec![Messung::neu(SPEICHER_METRIK, mb(prozess.memory()))
            .mit_metadata(json!({ "systemTotalMb": mb(self.system.total_memory()) }))])
    }
}

// ---------------------------------------------------------------------------
// NetworkProbe
// ---------------------------------------------------------------------------

/// Verbindungsart anhand des Schnittstellennamens
pub fn netzwerk_typ(schnittstelle: &str) -> &'static str {
    let name = schnittstelle.to_ascii_lowercase();
    if name.starts_with("wl") || name.starts_with("wi-fi") || name.starts_with("wifi") {
        "wifi"
    } else if name.starts_with("ww") || name.starts_with("rmnet") || name.starts_with("pdp_ip") {
        "cellular"
    } else if name.starts_with("eth") || name.starts_with("en") {
        "ethernet"
    } else {
        "other"
    }
}

fn ist_loopback(schnittstelle: &str) -> bool {
    schnittstelle == "lo" || schnittstelle.starts_with("lo0") || schnittstelle.contains("Loopback")
}

/// Netzwerk-Schnittstellen via sysinfo
///
/// Aktiv ist eine Schnittstelle ausser Loopback, die bereits Daten
/// uebertragen hat. Der Typ ist der der aktivsten Schnittstelle.
#[derive(Debug, Default)]
pub struct NetworkProbe;

impl NetworkProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Probe for NetworkProbe {
    fn name(&self) -> &'static str {
        "network"
    }

    fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
        let networks = Networks::new_with_refreshed_list();
        let mut aktiv: Vec<(&str, u64, u64)> = networks
            .iter()
            .filter(|(name, _)| !ist_loopback(name))
            .map(|(name, daten)| {
                (name.as_str(), daten.total_received(), daten.total_transmitted())
            })
            .filter(|(_, rx, tx)| rx + tx > 0)
            .collect();
        if aktiv.is_empty() {
            return Err(TelemetryError::NichtUnterstuetzt("network"));
        }
        aktiv.sort_by_key(|(_, rx, tx)| std::cmp::Reverse(rx + tx));

        let typ = netzwerk_typ(aktiv[0].0);
        let rx: u64 = aktiv.iter().map(|(_, rx, _)| rx).sum();
        let tx: u64 = aktiv.iter().map(|(_, _, tx)| tx).sum();
        let namen: Vec<&str> = aktiv.iter().map(|(name, _, _)| *name).collect();
        Ok(vec![Messung::neu(NETZWERK_METRIK, aktiv.len() as f64).mit_metadata(json!({
            "typ": typ,
            "interfaces": namen,
            "rxBytes": rx,
            "txBytes": tx,
        }))])
    }
}

// ---------------------------------------------------------------------------
// BatteryProbe
// ---------------------------------------------------------------------------

/// Akku-Ladestand via starship-battery
///
/// Ohne Akku (Desktop, Server, Container) nicht unterstuetzt.
#[derive(Debug, Default)]
pub struct BatteryProbe;

impl BatteryProbe {
    pub fn new() -> Self {
        Self
    }
}

impl Probe for BatteryProbe {
    fn name(&self) -> &'static str {
        "battery"
    }

    fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
        // Manager ist nicht auf allen Plattformen Send
        let manager =
            starship_battery::Manager::new().map_err(|_| TelemetryError::NichtUnterstuetzt("battery"))?;
        let akkus = manager
            .batteries()
            .map_err(|_| TelemetryError::NichtUnterstuetzt("battery"))?;

        let messungen: Vec<Messung> = akkus
            .flatten()
            .map(|akku| {
                let prozent = f64::from(akku.state_of_charge().value) * 100.0;
                Messung::neu(AKKU_METRIK, prozent)
                    .mit_metadata(json!({ "state": akku.state().to_string() }))
            })
            .collect();
        if messungen.is_empty() {
            return Err(TelemetryError::NichtUnterstuetzt("battery"));
        }
        Ok(messungen)
    }
}

/// Standard-Quellen: Speicher, Netzwerk und Akku
pub fn standard_probes() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(MemoryProbe::new()),
        Box::new(NetworkProbe::new()),
        Box::new(BatteryProbe::new()),
    ]
}

// ---------------------------------------------------------------------------
// StallDetector
// ---------------------------------------------------------------------------

/// Erkennt blockierte Runtime-Threads (Long Tasks)
///
/// Schlaeft einen Takt lang und misst wie viel spaeter als geplant der
/// Task wieder aufwacht.
#[derive(Debug, Clone, Copy)]
pub struct StallDetector {
    intervall: Duration,
    schwelle: Duration,
}

impl StallDetector {
    pub fn new(intervall: Duration, schwelle: Duration) -> Self {
        Self {
            intervall,
            schwelle,
        }
    }

    /// Ein Takt; `Some(verspaetung)` wenn die Schwelle erreicht wurde
    pub async fn takt(&self) -> Option<Duration> {
        let start = tokio::time::Instant::now();
        tokio::time::sleep(self.intervall).await;
        let verspaetung = start.elapsed().saturating_sub(self.intervall);
        (verspaetung >= self.schwelle).then_some(verspaetung)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KaputtProbe;

    impl Probe for KaputtProbe {
        fn name(&self) -> &'static str {
            "battery"
        }
        fn messen(&mut self) -> TelemetryResult<Vec<Messung>> {
            Err(TelemetryError::NichtUnterstuetzt("battery"))
        }
    }

    #[test]
    fn noop_liefert_nichts() {
        let mut p = NoopProbe::new("network");
        assert_eq!(p.name(), "network");
        assert!(p.messen().unwrap().is_empty());
    }

    #[test]
    fn fehlerhafte_quelle_meldet_nicht_unterstuetzt() {
        let mut p: Box<dyn Probe> = Box::new(KaputtProbe);
        assert!(matches!(p.messen(), Err(TelemetryError::NichtUnterstuetzt("battery"))));
    }

    #[test]
    fn standard_quellen() {
        let namen: Vec<_> = standard_probes().iter().map(|p| p.name()).collect();
        assert_eq!(namen, vec!["memory", "network", "battery"]);
    }

    #[test]
    fn speicher_messung_plausibel() {
        let mut p = MemoryProbe::new();
        // Auf exotischen Plattformen nicht unterstuetzt, dann ist der Fehler korrekt
        if let Ok(werte) = p.messen() {
            assert_eq!(werte.len(), 1);
            assert_eq!(werte[0].metric, SPEICHER_METRIK);
            assert!(werte[0].wert > 0.0);
        }
    }

    #[test]
    fn netzwerk_typ_nach_schnittstelle() {
        assert_eq!(netzwerk_typ("wlan0"), "wifi");
        assert_eq!(netzwerk_typ("wlp3s0"), "wifi");
        assert_eq!(netzwerk_typ("Wi-Fi"), "wifi");
        assert_eq!(netzwerk_typ("eth0"), "ethernet");
        assert_eq!(netzwerk_typ("enp0s31f6"), "ethernet");
        assert_eq!(netzwerk_typ("wwan0"), "cellular");
        assert_eq!(netzwerk_typ("docker0"), "other");
        assert!(ist_loopback("lo"));
        assert!(!ist_loopback("eth0"));
    }

    #[test]
    fn netzwerk_messung_oder_nicht_unterstuetzt() {
        let mut p = NetworkProbe::new();
        match p.messen() {
            Ok(werte) => {
                assert_eq!(werte.len(), 1);
                assert_eq!(werte[0].metric, NETZWERK_METRIK);
                assert!(werte[0].wert >= 1.0);
                let meta = werte[0].metadata.as_ref().unwrap();
                assert!(meta["typ"].is_string());
            }
            Err(e) => assert!(matches!(e, TelemetryError::NichtUnterstuetzt("network"))),
        }
    }

    #[test]
    fn akku_messung_oder_nicht_unterstuetzt() {
        let mut p = BatteryProbe::new();
        match p.messen() {
            Ok(werte) => {
                assert!(!werte.is_empty());
                assert!(werte.iter().all(|m| m.metric == AKKU_METRIK));
                assert!(werte.iter().all(|m| (0.0..=100.0).contains(&m.wert)));
            }
            // Ohne Akku, etwa im CI-Container
            Err(e) => assert!(matches!(e, TelemetryError::NichtUnterstuetzt("battery"))),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn kein_stall_bei_puenktlichem_takt() {
        let d = StallDetector::new(Duration::from_millis(100), Duration::from_millis(50));
        assert_eq!(d.takt().await, None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn blockierter_thread_wird_erkannt() {
        let d = StallDetector::new(Duration::from_millis(10), Duration::from_millis(50));
        let handle = tokio::spawn(async move { d.takt().await });
        tokio::task::yield_now().await;
        // Blockiert den einzigen Runtime-Thread
        std::thread::sleep(Duration::from_millis(120));
        let verspaetung = handle.await.unwrap();
        assert!(verspaetung.is_some());
    }
}
