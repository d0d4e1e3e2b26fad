//! Event system for discovery, connection and pairing notifications.
//!
//! Components publish [`RemoteEvent`]s on a broadcast channel instead of
//! calling back into a UI. Any number of subscribers may listen; events are
//! dropped silently when nobody does.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tvremote_types::Button;

use crate::pairing::PairingState;

/// Events published by the remote.
///
/// All events are serializable for logging and `--json` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RemoteEvent {
    /// Progress of a discovery session.
    Discovery(DiscoveryEvent),
    /// Central-role connection activity.
    Connection(ConnectionEvent),
    /// Pairing-mode activity.
    Pairing(PairingEvent),
}

/// Discovery progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DiscoveryEvent {
    /// A discovery pass is starting.
    PassStarted { pass: u32, of: u32 },
    /// A discovery pass finished.
    PassCompleted {
        pass: u32,
        sightings: usize,
        new_peripherals: usize,
    },
    /// A pass timed out or hit a transient error and was counted as empty.
    PassFailed { pass: u32, error: String },
    /// Discovery finished.
    Finished { peripherals: usize },
}

/// Connection activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConnectionEvent {
    /// A connection attempt is starting.
    AttemptStarted {
        address: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// The next attempt will start after `delay_ms`.
    RetryScheduled { address: String, delay_ms: u64 },
    /// Connected.
    Connected { address: String, attempts: u32 },
    /// Connecting gave up.
    Failed {
        address: String,
        attempts: u32,
        reason: String,
    },
    /// A session was closed.
    Disconnected { address: String },
    /// A button press and release were written.
    CommandSent { address: String, button: Button },
}

/// Pairing-mode activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum PairingEvent {
    /// The pairing state machine moved.
    StateChanged { state: PairingState },
    /// A TV connected to the advertised remote.
    PeerConnected { address: Option<String> },
    /// The TV disconnected.
    PeerDisconnected,
    /// Nobody connected before the pairing timeout. Not an error.
    TimedOut { after_secs: u64 },
    /// A button was sent to the connected TV.
    CommandSent { button: Button },
}

impl From<DiscoveryEvent> for RemoteEvent {
    fn from(event: DiscoveryEvent) -> Self {
        RemoteEvent::Discovery(event)
    }
}

impl From<ConnectionEvent> for RemoteEvent {
    fn from(event: ConnectionEvent) -> Self {
        RemoteEvent::Connection(event)
    }
}

impl From<PairingEvent> for RemoteEvent {
    fn from(event: PairingEvent) -> Self {
        RemoteEvent::Pairing(event)
    }
}

/// Sender for remote events.
pub type EventSender = broadcast::Sender<RemoteEvent>;

/// Receiver for remote events.
pub type EventReceiver = broadcast::Receiver<RemoteEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: impl Into<RemoteEvent>) {
        // Ignore error if no receivers
        let _ = self.sender.send(event.into());
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RemoteEvent::from(ConnectionEvent::RetryScheduled {
            address: "AA:BB".to_string(),
            delay_ms: 2000,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"source\":\"connection\""));
        assert!(json.contains("\"type\":\"retry_scheduled\""));
        assert!(json.contains("\"delay_ms\":2000"));

        let back: RemoteEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_pairing_event_serialization() {
        let event = RemoteEvent::from(PairingEvent::StateChanged {
            state: PairingState::Advertising,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"state\":\"advertising\""));
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(16);
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(DiscoveryEvent::Finished { peripherals: 3 });

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert_eq!(
                event,
                RemoteEvent::Discovery(DiscoveryEvent::Finished { peripherals: 3 })
            );
        }
    }

    #[test]
    fn test_send_without_receivers_is_ignored() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(PairingEvent::PeerDisconnected);
        assert_eq!(dispatcher.receiver_count(), 0);
    }
}
