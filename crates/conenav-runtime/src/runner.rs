//! [`NodeRunner`] – serializes bus traffic onto one [`NavigationNode`].
//!
//! Configuration, goal and sensor lanes are multiplexed with `tokio::select!`
//! into a single task, so exactly one handler runs at a time. Config batches
//! are polled first, then goals, then sensors; a parameter change therefore
//! always lands between two planning ticks, never inside one.
//!
//! # Example
//!
//! ```rust,no_run
//! use conenav_middleware::EventBus;
//! use conenav_runtime::{NavConfig, NavigationNode, NodeRunner};
//!
//! # async fn run() -> Result<(), conenav_types::NavError> {
//! let bus = EventBus::default();
//! let node = NavigationNode::new(NavConfig::default())?;
//! let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
//! let handle = tokio::spawn(NodeRunner::new(node, bus.clone()).run(stop_rx));
//! // ... publish sensors and goals on `bus` ...
//! let _ = stop_tx.send(true);
//! let _node = handle.await;
//! # Ok(())
//! # }
//! ```

use tokio::sync::watch;
use tracing::{debug, info};

use conenav_middleware::{EventBus, Topic, TopicReceiver};
use conenav_types::{Event, EventPayload, Twist};

use crate::node::NavigationNode;

/// `source` stamped on every event the node publishes.
pub const SOURCE: &str = "conenav-runtime::node";

/// Owns a node and the bus subscriptions that feed it.
pub struct NodeRunner {
    node: NavigationNode,
    bus: EventBus,
    config: TopicReceiver,
    goals: TopicReceiver,
    sensors: TopicReceiver,
}

impl NodeRunner {
    /// Subscribe to the inbound lanes immediately, so nothing published
    /// after this call is missed.
    pub fn new(node: NavigationNode, bus: EventBus) -> Self {
        Self {
            config: bus.subscribe_to(Topic::Config),
            goals: bus.subscribe_to(Topic::Goals),
            sensors: bus.subscribe_to(Topic::Sensors),
            node,
            bus,
        }
    }

    /// Process events until `shutdown` flips to `true` or its sender is
    /// dropped. A final zero velocity command is published on the way out.
    /// Returns the node for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> NavigationNode {
        info!("navigation node running");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let event = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                Some(event) = self.config.next() => event,
                Some(event) = self.goals.next() => event,
                Some(event) = self.sensors.next() => event,
                else => break,
            };
            self.dispatch(event);
        }
        self.publish(EventPayload::CmdVel(Twist::default()));
        info!("navigation node stopped");
        self.node
    }

    /// Handle one event and publish whatever it produced.
    pub fn dispatch(&mut self, event: Event) {
        for payload in self.node.handle(event.payload) {
            self.publish(payload);
        }
    }

    fn publish(&self, payload: EventPayload) {
        if let Err(e) = self.bus.publish(Event::new(SOURCE, payload)) {
            // Nobody listening on that lane.
            debug!(error = %e, "output not delivered");
        }
    }
}
