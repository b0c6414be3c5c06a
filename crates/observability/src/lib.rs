//! # voxlane-observability
//!
//! Structured Logging via tracing-subscriber. Wird genau einmal vom
//! Binary initialisiert, Bibliotheks-Crates loggen nur ueber `tracing`.

pub mod logging;

pub use logging::{log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat};
