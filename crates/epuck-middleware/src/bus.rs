//! Topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so every subscriber receives every
//! message and a slow subscriber never blocks a publisher.  Publishing is best
//! effort: with nobody listening the event is dropped and the publisher
//! carries on.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Operator messages, pose updates |
//! | [`Topic::Mapping`] | Calibration results, discovered objects, photos, map reports |
//! | [`Topic::Alerts`] | Melodies, hardware faults |
//!
//! Every event is also mirrored to a global channel for observers that want
//! the whole stream (see [`EventBus::subscribe_all`]).

use epuck_types::{Event, EventPayload, Verbosity};
use tokio::sync::broadcast;
use tracing::trace;

/// Events buffered per channel before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    Mapping,
    Alerts,
}

/// Shared event bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    all: broadcast::Sender<Event>,
    telemetry: broadcast::Sender<Event>,
    mapping: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
    min_verbosity: Verbosity,
}

impl EventBus {
    /// Create a bus with `capacity` slots per channel, forwarding messages of
    /// at least `min_verbosity`.
    pub fn new(capacity: usize, min_verbosity: Verbosity) -> Self {
        let (all, _) = broadcast::channel(capacity);
        let (telemetry, _) = broadcast::channel(capacity);
        let (mapping, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            all,
            telemetry,
            mapping,
            alerts,
            min_verbosity,
        }
    }

    /// Publish `payload` on `topic`, stamped with `source`.
    ///
    /// Returns how many topic subscribers were handed the event; `0` when
    /// nobody listens, which is not an error.
    pub fn publish(&self, topic: Topic, source: &str, payload: EventPayload) -> usize {
        let event = Event::new(source, payload);
        let _ = self.all.send(event.clone());
        let delivered = self.topic_sender(topic).send(event).unwrap_or(0);
        trace!(?topic, source, delivered, "event published");
        delivered
    }

    /// Best-effort operator message on [`Topic::Telemetry`].
    ///
    /// Messages below the bus's minimum verbosity are dropped.  Never blocks
    /// and never fails.
    pub fn write_message(&self, source: &str, text: impl Into<String>, verbosity: Verbosity) {
        if verbosity < self.min_verbosity {
            return;
        }
        self.publish(
            Topic::Telemetry,
            source,
            EventPayload::Message {
                text: text.into(),
                verbosity,
            },
        );
    }

    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic: Some(topic),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Receive every event regardless of topic.
    pub fn subscribe_all(&self) -> TopicReceiver {
        TopicReceiver {
            topic: None,
            receiver: self.all.subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::Mapping => &self.mapping,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Verbosity::Info)
    }
}

/// An async receiver bound to one [`Topic`], or to every topic.
pub struct TopicReceiver {
    topic: Option<Topic>,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// `Err(RecvError::Lagged(n))` means `n` events were dropped because this
    /// receiver fell behind; `Err(RecvError::Closed)` means the bus is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// The topic this receiver is bound to; `None` for the global stream.
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }
}
