//! Tempest weather station ingestion engine.
//!
//! Keeps one authoritative snapshot of the station's latest readings,
//! fed by the live WebSocket stream and, during sustained stream outages,
//! by polling the REST API.
//!
//! ```text
//! stream ──► observation (obs_st) ──┐
//!                                   ├──► store ──► read_snapshot() + derived
//! rest   ──► observation (REST)  ───┘
//! ```

pub mod config;
pub mod derived;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod observation;
pub mod redact;
pub mod rest;
pub mod status;
pub mod store;
pub mod stream;

pub use config::Config;
pub use derived::{dew_point, feels_like};
pub use engine::Engine;
pub use error::{ConfigError, DecodeError, FetchError, StreamError};
pub use fallback::{ObservationSource, PollingFallback};
pub use observation::{Observation, UNKNOWN};
pub use rest::RestClient;
pub use store::{Snapshot, SnapshotStore};
pub use stream::{StreamConnector, StreamSettings};
