// Feedback ingestion loop with a 50 Hz watchdog
// Note: the watchdog only reports; it never commands the robot. Staleness is
// what makes is_moving() answer "unknown", so it is worth seeing in the logs.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{LOOP_HZ, TOPIC_JOINT_FEEDBACK};
use crate::feedback::FeedbackSnapshot;
use crate::messages::{FeedbackHealth, JointState};
use crate::robot::FeedbackSink;
use crate::transport::FeedbackSubscriber;

/// Tracks feedback health and logs transitions
pub struct FeedbackWatchdog {
    stale_after: Duration,
    health: FeedbackHealth,
}

impl FeedbackWatchdog {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            health: FeedbackHealth::Stale, // stale until first message
        }
    }

    pub fn health(&self) -> FeedbackHealth {
        self.health
    }

    /// Re-evaluate against the latest snapshot
    pub fn check(&mut self, latest: Option<&FeedbackSnapshot>) -> FeedbackHealth {
        let health = match latest {
            Some(snapshot) if !snapshot.is_stale(self.stale_after) => FeedbackHealth::Ok,
            _ => FeedbackHealth::Stale,
        };
        if health != self.health {
            match (health, latest) {
                (FeedbackHealth::Stale, Some(snapshot)) => {
                    warn!("Joint feedback stale ({:?} old)", snapshot.age())
                }
                (FeedbackHealth::Stale, None) => warn!("No joint feedback"),
                (FeedbackHealth::Ok, _) => info!("Joint feedback healthy"),
            }
            self.health = health;
        }
        health
    }
}

/// Decode one feedback payload into joint name -> position
pub fn decode_feedback(payload: &[u8]) -> Result<HashMap<String, f64>, serde_json::Error> {
    let state: JointState = serde_json::from_slice(payload)?;
    if state.name.len() != state.position.len() {
        debug!(
            "Feedback has {} names and {} positions",
            state.name.len(),
            state.position.len()
        );
    }
    Ok(state.into_positions())
}

/// Drain the feedback subscriber into `sink` until the session goes away
pub async fn ingest_feedback(subscriber: FeedbackSubscriber, sink: FeedbackSink) {
    let mut watchdog = FeedbackWatchdog::new(sink.stale_after());
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Feedback ingestion started: {}Hz watchdog, {}ms staleness window",
        LOOP_HZ,
        sink.stale_after().as_millis()
    );
    info!("Subscribed to: {}", TOPIC_JOINT_FEEDBACK);

    loop {
        tokio::select! {
            sample = subscriber.recv_async() => match sample {
                Ok(sample) => {
                    let payload = sample.payload().to_bytes();
                    match decode_feedback(&payload) {
                        Ok(positions) => sink.ingest(positions),
                        Err(e) => warn!("Failed to parse feedback: {}", e),
                    }
                }
                Err(e) => {
                    warn!("Feedback subscriber closed: {}", e);
                    sink.connection_lost();
                    break;
                }
            },
            _ = tick.tick() => {
                watchdog.check(sink.latest().as_deref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackCache;

    #[test]
    fn test_decode_feedback() {
        let payload = br#"{"name":["head_pitch","waist"],"position":[-0.1,0.2]}"#;
        let positions = decode_feedback(payload).unwrap();
        assert_eq!(positions["head_pitch"], -0.1);
        assert_eq!(positions["waist"], 0.2);

        assert!(decode_feedback(b"not json").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_transitions() {
        let cache = FeedbackCache::new();
        let mut watchdog = FeedbackWatchdog::new(Duration::from_millis(500));
        assert_eq!(watchdog.check(None), FeedbackHealth::Stale);

        let snapshot = cache.store(HashMap::from([("waist".to_string(), 0.0)]));
        assert_eq!(watchdog.check(Some(snapshot.as_ref())), FeedbackHealth::Ok);
        assert_eq!(watchdog.health(), FeedbackHealth::Ok);

        tokio::time::advance(Duration::from_millis(501)).await;
        assert_eq!(watchdog.check(Some(snapshot.as_ref())), FeedbackHealth::Stale);
    }
}
