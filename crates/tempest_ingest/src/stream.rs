//! Live WebSocket stream client.
//!
//! One session is: dial → send `listen_start` → read until error. The
//! connector runs sessions back to back with exponential backoff in
//! between, until the shutdown channel fires.
//!
//! Shutdown is observed while dialing, while sending the subscribe frame,
//! during every read and during the backoff wait.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use crate::error::StreamError;
use crate::observation::{decode_stream_frame, is_unknown, to_float};
use crate::store::SnapshotStore;

/// Default WebSocket endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://ws.weatherflow.com/swd/data";

/// Client id sent with `listen_start`.
const CLIENT_ID: &str = "tempest-ingest";

// ── Backoff ─────────────────────────────────────────────────────────

/// Reconnect delay parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// A session that lasted longer than this resets the delay to `initial`.
    pub stable_after: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            stable_after: Duration::from_secs(120),
        }
    }
}

/// Reconnect delay state, owned by the connector task.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
        }
    }

    /// Delay to wait after a session that lasted `session`, then advance.
    pub fn next_delay(&mut self, session: Duration) -> Duration {
        if session > self.policy.stable_after {
            self.current = self.policy.initial;
        }
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.policy.max);
        delay
    }
}

// ── Parse error log throttle ────────────────────────────────────────

/// Counts unparseable messages; allows a log line on the 1st and every 100th.
#[derive(Debug, Default)]
pub struct ParseErrorLog {
    count: u64,
}

impl ParseErrorLog {
    /// Record one failure. Returns the running total if this one should be logged.
    pub fn record(&mut self) -> Option<u64> {
        self.count += 1;
        if self.count == 1 || self.count % 100 == 0 {
            Some(self.count)
        } else {
            None
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

// ── Wire messages ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ObsStMessage {
    #[serde(default)]
    obs: Vec<Vec<Value>>,
}

/// `evt_strike` and `evt_precip` share this shape.
#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(default)]
    evt: Vec<Value>,
}

/// What a single inbound message turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Observation,
    Lightning,
    RainStart,
    Control,
    Unknown,
    /// Envelope could not be parsed.
    ParseError,
    /// Recognised type but unusable body; nothing stored.
    Dropped,
}

/// Parse the device id for `listen_start`; the API requires a number.
pub fn parse_device_id(device_id: &str) -> Result<i64, StreamError> {
    device_id
        .parse::<i64>()
        .map_err(|e| StreamError::InvalidDeviceId {
            device_id: device_id.to_string(),
            reason: e.to_string(),
        })
}

/// Append the token query parameter to the configured endpoint.
pub fn stream_request_url(base: &str, token: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{}{}token={}", base, sep, token)
}

/// Build the `listen_start` subscribe frame.
pub fn listen_start_frame(device_id: i64) -> String {
    json!({
        "type": "listen_start",
        "device_id": device_id,
        "id": CLIENT_ID,
    })
    .to_string()
}

// ── Connector ───────────────────────────────────────────────────────

/// Connection parameters for the stream.
#[derive(Clone)]
pub struct StreamSettings {
    pub url: String,
    pub token: String,
    pub device_id: String,
    /// Upper bound on the wait for any single message.
    pub read_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl std::fmt::Debug for StreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSettings")
            .field("url", &self.url)
            .field("token", &crate::redact::REDACTED)
            .field("device_id", &self.device_id)
            .field("read_timeout", &self.read_timeout)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Maintains the WebSocket session and feeds the store.
pub struct StreamConnector {
    settings: StreamSettings,
    store: Arc<SnapshotStore>,
    parse_errors: ParseErrorLog,
}

impl StreamConnector {
    pub fn new(settings: StreamSettings, store: Arc<SnapshotStore>) -> Self {
        Self {
            settings,
            store,
            parse_errors: ParseErrorLog::default(),
        }
    }

    /// Run sessions until shutdown. Never gives up on its own.
    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        let mut backoff = Backoff::new(self.settings.backoff);

        loop {
            let started = Instant::now();
            let err = self.session(&mut shutdown).await;
            if matches!(err, StreamError::Cancelled) {
                log::info!("WebSocket client shutting down");
                return;
            }

            self.store.set_connected(false);
            self.store.increment_reconnects();

            let delay = backoff.next_delay(started.elapsed());
            log::warn!(
                "WebSocket disconnected: {}. Reconnecting in {:?}",
                err,
                delay
            );

            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("WebSocket client shutting down");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One connect/subscribe/read cycle. Always ends in an error.
    async fn session(&mut self, shutdown: &mut watch::Receiver<()>) -> StreamError {
        let token = self.settings.token.clone();
        let url = stream_request_url(&self.settings.url, &token);

        let (mut ws, _response) = tokio::select! {
            _ = shutdown.changed() => return StreamError::Cancelled,
            result = tokio_tungstenite::connect_async(url.as_str()) => match result {
                Ok(pair) => pair,
                Err(e) => return StreamError::dial(e, &token),
            },
        };

        let device_id = match parse_device_id(&self.settings.device_id) {
            Ok(id) => id,
            Err(e) => return e,
        };

        let frame = Message::Text(listen_start_frame(device_id).into());
        tokio::select! {
            _ = shutdown.changed() => return StreamError::Cancelled,
            result = ws.send(frame) => {
                if let Err(e) = result {
                    return StreamError::subscribe(e, &token);
                }
            }
        }

        self.store.set_connected(true);
        self.parse_errors.reset();
        log::info!("WebSocket connected, listening to device {}", device_id);

        // Only data frames move the deadline; pings alone do not keep a session alive.
        let read_timeout = self.settings.read_timeout;
        let mut deadline = tokio::time::Instant::now() + read_timeout;
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => return StreamError::Cancelled,
                next = tokio::time::timeout_at(deadline, ws.next()) => next,
            };

            let message = match next {
                Err(_) => return StreamError::ReadTimeout(read_timeout),
                Ok(None) => return StreamError::Closed,
                Ok(Some(Err(e))) => return StreamError::read(e, &token),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => {
                    deadline = tokio::time::Instant::now() + read_timeout;
                    self.dispatch(text.as_str().as_bytes());
                }
                Message::Binary(data) => {
                    deadline = tokio::time::Instant::now() + read_timeout;
                    self.dispatch(&data);
                }
                Message::Close(frame) => {
                    log::info!("Server sent close frame: {:?}", frame);
                    return StreamError::Closed;
                }
                // Pings are answered by tungstenite itself.
                _ => {}
            }
        }
    }

    /// Route one message by its `type` discriminant.
    pub fn dispatch(&mut self, data: &[u8]) -> Dispatch {
        let envelope: Envelope = match serde_json::from_slice(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                if let Some(total) = self.parse_errors.record() {
                    log::warn!(
                        "Ignoring unparseable message ({} total): {}",
                        total,
                        e
                    );
                }
                return Dispatch::ParseError;
            }
        };

        match envelope.kind.as_str() {
            "obs_st" => self.handle_observation(data),
            "evt_strike" => self.handle_strike(data),
            "evt_precip" => self.handle_precip(data),
            "ack" | "connection_opened" => {
                log::info!("Received control message: {}", envelope.kind);
                Dispatch::Control
            }
            other => {
                log::warn!("Ignoring unknown message type: {:?}", other);
                Dispatch::Unknown
            }
        }
    }

    /// Unparseable envelopes seen since the current session subscribed.
    pub fn parse_error_count(&self) -> u64 {
        self.parse_errors.count()
    }

    fn handle_observation(&self, data: &[u8]) -> Dispatch {
        let msg: ObsStMessage = match serde_json::from_slice(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("Error parsing obs_st: {}", e);
                return Dispatch::Dropped;
            }
        };
        let Some(frame) = msg.obs.first() else {
            log::warn!("obs_st with empty obs array");
            return Dispatch::Dropped;
        };
        let obs = match decode_stream_frame(frame) {
            Ok(obs) => obs,
            Err(e) => {
                log::error!("Error decoding observation: {}", e);
                return Dispatch::Dropped;
            }
        };

        self.store.replace_observation(obs);
        log::info!(
            "Observation updated: temp={}°C humidity={}% wind={}m/s pressure={}mb",
            obs.air_temperature,
            obs.relative_humidity,
            obs.wind_avg,
            obs.station_pressure
        );
        Dispatch::Observation
    }

    fn handle_strike(&self, data: &[u8]) -> Dispatch {
        let msg: EventMessage = match serde_json::from_slice(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("Error parsing evt_strike: {}", e);
                return Dispatch::Dropped;
            }
        };
        if msg.evt.len() < 3 {
            return Dispatch::Dropped;
        }
        let distance = to_float(&msg.evt[1]);
        let energy = to_float(&msg.evt[2]);
        if !is_unknown(distance) {
            log::info!(
                "Lightning strike detected: distance={}km energy={}",
                distance,
                energy
            );
        }
        Dispatch::Lightning
    }

    fn handle_precip(&self, data: &[u8]) -> Dispatch {
        let msg: EventMessage = match serde_json::from_slice(data) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("Error parsing evt_precip: {}", e);
                return Dispatch::Dropped;
            }
        };
        let Some(epoch) = msg.evt.first().map(to_float) else {
            return Dispatch::Dropped;
        };
        // Zero means "no event"; never let it replace a recorded start.
        if is_unknown(epoch) || epoch <= 0.0 {
            return Dispatch::Dropped;
        }
        self.store.set_rain_start(epoch);
        log::info!("Rain start event at epoch {}", epoch);
        Dispatch::RainStart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Snapshot;

    fn connector() -> (StreamConnector, Arc<SnapshotStore>) {
        let store = Arc::new(SnapshotStore::new());
        let settings = StreamSettings {
            url: "ws://127.0.0.1:1".to_string(),
            token: "test-token".to_string(),
            device_id: "12345".to_string(),
            read_timeout: Duration::from_secs(300),
            backoff: BackoffPolicy::default(),
        };
        (StreamConnector::new(settings, store.clone()), store)
    }

    const OBS_ST: &str = r#"{
        "type": "obs_st",
        "device_id": 12345,
        "obs": [[1700000000, 0.5, 1.2, 2.3, 180, 3, 1013.25, 22.5, 65.0,
                 50000, 3.5, 300, 0.1, 1, 10, 2, 2.65, 1]]
    }"#;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let quick = Duration::from_secs(1);
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay(quick).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn test_backoff_resets_after_stable_session() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        let quick = Duration::from_secs(1);
        for _ in 0..5 {
            backoff.next_delay(quick);
        }
        assert_eq!(backoff.next_delay(Duration::from_secs(121)), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(quick), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_exactly_two_minutes_does_not_reset() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        backoff.next_delay(Duration::ZERO);
        assert_eq!(
            backoff.next_delay(Duration::from_secs(120)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_parse_error_log_rate_limit() {
        let mut log = ParseErrorLog::default();
        let logged: Vec<u64> = (0..250).filter_map(|_| log.record()).collect();
        assert_eq!(logged, vec![1, 100, 200]);
        assert_eq!(log.count(), 250);
        log.reset();
        assert_eq!(log.record(), Some(1));
    }

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id("12345").unwrap(), 12345);
        for bad in ["", "abc", "12a", " 12", "1.5"] {
            assert!(
                matches!(parse_device_id(bad), Err(StreamError::InvalidDeviceId { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_stream_request_url() {
        assert_eq!(
            stream_request_url("wss://ws.weatherflow.com/swd/data", "abc"),
            "wss://ws.weatherflow.com/swd/data?token=abc"
        );
        assert_eq!(
            stream_request_url("ws://127.0.0.1:9000/data?api=2", "abc"),
            "ws://127.0.0.1:9000/data?api=2&token=abc"
        );
    }

    #[test]
    fn test_listen_start_frame() {
        let frame: Value = serde_json::from_str(&listen_start_frame(42)).unwrap();
        assert_eq!(frame["type"], "listen_start");
        assert_eq!(frame["device_id"], 42);
        assert_eq!(frame["id"], CLIENT_ID);
    }

    #[test]
    fn test_dispatch_observation() {
        let (mut c, store) = connector();
        assert_eq!(c.dispatch(OBS_ST.as_bytes()), Dispatch::Observation);
        let obs = store.read_snapshot().observation.unwrap();
        assert_eq!(obs.timestamp, 1700000000);
        assert_eq!(obs.air_temperature, 22.5);
    }

    #[test]
    fn test_dispatch_bad_observation_bodies_dropped() {
        let (mut c, store) = connector();
        for body in [
            r#"{"type":"obs_st","obs":[]}"#,
            r#"{"type":"obs_st"}"#,
            r#"{"type":"obs_st","obs":[[1700000000, 1.0]]}"#,
            r#"{"type":"obs_st","obs":[[null,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0]]}"#,
            r#"{"type":"obs_st","obs":"nope"}"#,
        ] {
            assert_eq!(c.dispatch(body.as_bytes()), Dispatch::Dropped, "{body}");
        }
        assert!(!store.has_observation());
        assert_eq!(c.parse_error_count(), 0);
    }

    #[test]
    fn test_dispatch_parse_errors_counted_not_fatal() {
        let (mut c, store) = connector();
        for _ in 0..3 {
            assert_eq!(c.dispatch(b"{not json"), Dispatch::ParseError);
        }
        assert_eq!(c.parse_error_count(), 3);
        assert_eq!(c.dispatch(OBS_ST.as_bytes()), Dispatch::Observation);
        assert!(store.has_observation());
    }

    #[test]
    fn test_dispatch_precip_sets_rain_start() {
        let (mut c, store) = connector();
        let body = r#"{"type":"evt_precip","device_id":12345,"evt":[1700000123]}"#;
        assert_eq!(c.dispatch(body.as_bytes()), Dispatch::RainStart);
        assert_eq!(store.read_snapshot().rain_start, Some(1700000123.0));

        assert_eq!(
            c.dispatch(br#"{"type":"evt_precip","evt":[]}"#),
            Dispatch::Dropped
        );
        assert_eq!(
            c.dispatch(br#"{"type":"evt_precip","evt":[null]}"#),
            Dispatch::Dropped
        );
        for body in [
            r#"{"type":"evt_precip","evt":[0]}"#,
            r#"{"type":"evt_precip","evt":[-5]}"#,
            r#"{"type":"evt_precip","evt":["0"]}"#,
        ] {
            assert_eq!(c.dispatch(body.as_bytes()), Dispatch::Dropped, "{body}");
        }
        assert_eq!(store.read_snapshot().rain_start, Some(1700000123.0));
    }

    #[test]
    fn test_dispatch_strike_needs_three_elements() {
        let (mut c, store) = connector();
        assert_eq!(
            c.dispatch(br#"{"type":"evt_strike","evt":[1700000000, 15.5, 100]}"#),
            Dispatch::Lightning
        );
        assert_eq!(
            c.dispatch(br#"{"type":"evt_strike","evt":[1700000000, 15.5]}"#),
            Dispatch::Dropped
        );
        assert_eq!(store.read_snapshot(), Snapshot::default());
    }

    #[test]
    fn test_dispatch_control_and_unknown() {
        let (mut c, store) = connector();
        assert_eq!(c.dispatch(br#"{"type":"ack","id":"x"}"#), Dispatch::Control);
        assert_eq!(
            c.dispatch(br#"{"type":"connection_opened"}"#),
            Dispatch::Control
        );
        assert_eq!(c.dispatch(br#"{"type":"rapid_wind"}"#), Dispatch::Unknown);
        assert_eq!(c.dispatch(br#"{"status":"ok"}"#), Dispatch::Unknown);
        assert_eq!(store.read_snapshot(), Snapshot::default());
    }

    #[test]
    fn test_settings_debug_hides_token() {
        let (c, _) = connector();
        assert!(!format!("{:?}", c.settings).contains("test-token"));
    }
}
