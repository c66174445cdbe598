//! Debounced change notification.
//!
//! The API layer drives a [`Debouncer`] from a bus subscription and
//! fans [`ChangeNotice`]s out to SSE subscribers. The feed is
//! best-effort and lossy: a subscriber that misses a notice still
//! converges by querying, because notices carry no payload, only
//! "something under this topic changed".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use tierstock_core::NetworkId;

/// Env var overriding the coalescing window, in milliseconds.
pub const NOTIFY_DEBOUNCE_ENV: &str = "TIERSTOCK_NOTIFY_DEBOUNCE_MS";

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Coarse change topics, one per read surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTopic {
    Registry,
    Stock,
    Orders,
    Requests,
    Remittances,
}

impl ChangeTopic {
    /// Stable wire name, used as the SSE event name.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeTopic::Registry => "registry",
            ChangeTopic::Stock => "stock",
            ChangeTopic::Orders => "orders",
            ChangeTopic::Requests => "requests",
            ChangeTopic::Remittances => "remittances",
        }
    }

    /// Map a published event type to its topic.
    pub fn for_event_type(event_type: &str) -> Option<ChangeTopic> {
        match event_type {
            "ledger.opened" | "ledger.custodian.registered" => Some(ChangeTopic::Registry),
            "ledger.stock.received" | "ledger.stock.allocated" => Some(ChangeTopic::Stock),
            "ledger.order.placed" | "ledger.order.stage_advanced" | "ledger.order.denied" => {
                Some(ChangeTopic::Orders)
            }
            "ledger.request.submitted"
            | "ledger.request.approved"
            | "ledger.request.forwarded"
            | "ledger.request.denied"
            | "ledger.request.cancelled" => Some(ChangeTopic::Requests),
            "ledger.remittance.recorded" => Some(ChangeTopic::Remittances),
            _ => None,
        }
    }
}

/// One coalesced change signal pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub network_id: NetworkId,
    pub topic: ChangeTopic,
}

/// Per-(network, topic) coalescing window.
///
/// [`Debouncer::observe`] answers "should this change be announced
/// now?": the first observation in a window passes, repeats inside the
/// window are swallowed. Distinct networks and topics never suppress
/// each other.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_emit: Mutex<HashMap<(NetworkId, ChangeTopic), Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emit: Mutex::new(HashMap::new()),
        }
    }

    /// Build with the window from `TIERSTOCK_NOTIFY_DEBOUNCE_MS`
    /// (milliseconds), falling back to 500ms.
    pub fn from_env() -> Self {
        let window = std::env::var(NOTIFY_DEBOUNCE_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DEBOUNCE);
        Self::new(window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a change; returns `Some(notice)` when it should be
    /// announced, `None` when coalesced into a recent one.
    pub fn observe(&self, network_id: NetworkId, topic: ChangeTopic) -> Option<ChangeNotice> {
        let now = Instant::now();
        let mut last_emit = self.last_emit.lock().ok()?;
        let key = (network_id, topic);

        match last_emit.get(&key) {
            Some(last) if now.duration_since(*last) < self.window => None,
            _ => {
                last_emit.insert(key, now);
                Some(ChangeNotice { network_id, topic })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_inside_the_window_are_swallowed() {
        let debouncer = Debouncer::new(Duration::from_millis(50));
        let network_id = NetworkId::new();

        assert!(debouncer.observe(network_id, ChangeTopic::Stock).is_some());
        assert!(debouncer.observe(network_id, ChangeTopic::Stock).is_none());

        std::thread::sleep(Duration::from_millis(60));
        assert!(debouncer.observe(network_id, ChangeTopic::Stock).is_some());
    }

    #[test]
    fn topics_and_networks_do_not_suppress_each_other() {
        let debouncer = Debouncer::new(Duration::from_millis(200));
        let network_a = NetworkId::new();
        let network_b = NetworkId::new();

        assert!(debouncer.observe(network_a, ChangeTopic::Stock).is_some());
        assert!(debouncer.observe(network_a, ChangeTopic::Orders).is_some());
        assert!(debouncer.observe(network_b, ChangeTopic::Stock).is_some());
    }

    #[test]
    fn every_ledger_event_type_maps_to_a_topic() {
        for event_type in [
            "ledger.opened",
            "ledger.custodian.registered",
            "ledger.stock.received",
            "ledger.stock.allocated",
            "ledger.order.placed",
            "ledger.order.stage_advanced",
            "ledger.order.denied",
            "ledger.request.submitted",
            "ledger.request.approved",
            "ledger.request.forwarded",
            "ledger.request.denied",
            "ledger.request.cancelled",
            "ledger.remittance.recorded",
        ] {
            assert!(
                ChangeTopic::for_event_type(event_type).is_some(),
                "unmapped event type: {event_type}"
            );
        }
        assert!(ChangeTopic::for_event_type("something.else").is_none());
    }
}
