//! voxlane-transport – Transport-Optimizer
//!
//! Haelt eine bidirektionale Streaming-Verbindung zum Sprach-Endpunkt:
//! - Verbindungs-Zustandsmaschine mit automatischem Reconnect (Backoff)
//! - Request/Response-Korrelation mit Timeouts
//! - Priority-Queue fuer Nachrichten waehrend der Trennung
//! - Geglaettete Latenz (EMA) und Verbindungsmetriken
//! - Typisierte Events ueber `tokio::sync::broadcast`

pub mod backoff;
pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod latency;
pub mod memory;
pub mod metrics;
pub mod optimizer;
pub mod queue;
pub mod websocket;

pub use backoff::Backoff;
pub use config::TransportConfig;
pub use connector::{Connector, Link, LinkEvent, WireMessage, CLOSE_NORMAL};
pub use error::{TransportError, TransportResult};
pub use event::TransportEvent;
pub use latency::LatencyEma;
pub use memory::{MemoryConnector, MemoryPeer};
pub use metrics::ConnectionMetrics;
pub use optimizer::TransportOptimizer;
pub use queue::{Priority, PriorityQueue, QueuedMessage};
pub use websocket::WebSocketConnector;
