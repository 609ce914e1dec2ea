// Zenoh session to the robot bridge
//
// Commands and feedback are JSON payloads on plain zenoh key expressions
// named after the robot's ROS2 topics. The robot side must decode JSON;
// a CDR-speaking ROS2 bridge will not understand these messages.
// One publisher is declared per topic.

use std::collections::HashMap;

use tracing::info;
use zenoh::Wait;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use super::Transport;
use crate::config::{COMMAND_TOPICS, RobotConfig, TOPIC_JOINT_FEEDBACK};
use crate::error::TransportError;

pub type FeedbackSubscriber = Subscriber<FifoChannelHandler<Sample>>;

fn zenoh_err(e: impl std::fmt::Display) -> TransportError {
    TransportError::Zenoh(e.to_string())
}

pub struct ZenohLink {
    session: zenoh::Session,
    publishers: HashMap<&'static str, Publisher<'static>>,
}

impl ZenohLink {
    /// Open a session (router endpoint from config, or scouting) and declare publishers
    pub async fn open(config: &RobotConfig) -> Result<Self, TransportError> {
        let mut zenoh_config = zenoh::Config::default();
        if let Some(endpoint) = config.router_endpoint() {
            info!("Connecting to zenoh router {}", endpoint);
            zenoh_config
                .insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint))
                .map_err(zenoh_err)?;
        } else {
            info!("No robot IP given, relying on zenoh scouting");
        }

        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh_config).await.map_err(zenoh_err)?;

        let mut publishers = HashMap::new();
        for topic in COMMAND_TOPICS {
            let publisher = session.declare_publisher(topic).await.map_err(zenoh_err)?;
            publishers.insert(topic, publisher);
        }
        info!("Publishing to: {}", COMMAND_TOPICS.join(", "));

        Ok(Self {
            session,
            publishers,
        })
    }

    /// Subscriber on the joint feedback topic
    pub async fn subscribe_feedback(&self) -> Result<FeedbackSubscriber, TransportError> {
        let subscriber = self
            .session
            .declare_subscriber(TOPIC_JOINT_FEEDBACK)
            .await
            .map_err(zenoh_err)?;
        info!("Subscribed to: {}", TOPIC_JOINT_FEEDBACK);
        Ok(subscriber)
    }

    pub async fn close(&self) -> Result<(), TransportError> {
        self.session.close().await.map_err(zenoh_err)
    }
}

impl Transport for ZenohLink {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let publisher = self
            .publishers
            .get(topic)
            .ok_or_else(|| TransportError::NoPublisher(topic.to_string()))?;
        publisher.put(payload).wait().map_err(zenoh_err)
    }
}
