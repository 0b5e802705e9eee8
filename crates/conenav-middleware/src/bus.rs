//! Headless, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into [`Topic`] lanes so components only receive
//! the messages they care about:
//!
//! | Topic | Traffic |
//! |---|---|
//! | [`Topic::Sensors`] | Odometry, laser scans, contact, cone bearings, transforms |
//! | [`Topic::Goals`] | Goal points |
//! | [`Topic::Config`] | Live parameter batches |
//! | [`Topic::Commands`] | Velocity commands to the drive base |
//! | [`Topic::Visualization`] | Path previews, grid snapshots, cone markers |
//! | [`Topic::Status`] | Goal-reached flags |

use conenav_types::{Event, EventPayload, NavError};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Sensors,
    Goals,
    Config,
    Commands,
    Visualization,
    Status,
}

impl Topic {
    /// The lane a payload belongs on.
    pub fn of(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::Odometry(_)
            | EventPayload::Scan(_)
            | EventPayload::Contact(_)
            | EventPayload::ConeBearing(_)
            | EventPayload::Transform(_) => Topic::Sensors,
            EventPayload::Goal(_) => Topic::Goals,
            EventPayload::Reconfigure(_) => Topic::Config,
            EventPayload::CmdVel(_) => Topic::Commands,
            EventPayload::Path(_) | EventPayload::Map(_) | EventPayload::ConeMarkers(_) => {
                Topic::Visualization
            }
            EventPayload::GoalReached(_) => Topic::Status,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    sensors: broadcast::Sender<Event>,
    goals: broadcast::Sender<Event>,
    config: broadcast::Sender<Event>,
    commands: broadcast::Sender<Event>,
    visualization: broadcast::Sender<Event>,
    status: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (sensors, _) = broadcast::channel(capacity);
        let (goals, _) = broadcast::channel(capacity);
        let (config, _) = broadcast::channel(capacity);
        let (commands, _) = broadcast::channel(capacity);
        let (visualization, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        Self {
            sensors,
            goals,
            config,
            commands,
            visualization,
            status,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`NavError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, NavError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|broadcast::error::SendError(_)| {
                NavError::Channel(format!("No subscribers for topic {topic:?}"))
            })
    }

    /// Publish `event` on the lane its payload belongs to.
    pub fn publish(&self, event: Event) -> Result<usize, NavError> {
        let topic = Topic::of(&event.payload);
        self.publish_to(topic, event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Sensors => &self.sensors,
            Topic::Goals => &self.goals,
            Topic::Config => &self.config,
            Topic::Commands => &self.commands,
            Topic::Visualization => &self.visualization,
            Topic::Status => &self.status,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Wait for the next event, logging and skipping over lag.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting, skipping over lag.
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged, events dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
