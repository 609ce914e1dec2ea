// Mock transport for tests and dry runs

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;

use super::Transport;
use crate::error::TransportError;

/// Records every published message in memory
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    published: Vec<(String, Vec<u8>)>,
    fail: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every following publish fail
    pub fn set_failing(&self, fail: bool) {
        self.inner().fail = fail;
    }

    /// All (topic, payload) pairs in publish order
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner().published.clone()
    }

    /// Decoded payloads published on `topic`
    pub fn messages<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.inner()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .filter_map(|(_, payload)| serde_json::from_slice(payload).ok())
            .collect()
    }

    /// Most recent decoded payload on `topic`
    pub fn last<T: DeserializeOwned>(&self, topic: &str) -> Option<T> {
        self.messages(topic).pop()
    }

    pub fn clear(&self) {
        self.inner().published.clear();
    }
}

impl Transport for MockTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut inner = self.inner();
        if inner.fail {
            return Err(TransportError::Zenoh("mock transport failure".into()));
        }
        inner.published.push((topic.to_string(), payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ChassisVelocity;
    use crate::transport::publish_json;

    #[test]
    fn test_records_and_decodes() {
        let mock = MockTransport::new();
        let velocity = ChassisVelocity {
            x_vel: 0.1,
            ..Default::default()
        };
        publish_json(&mock, "cmd", &velocity).unwrap();
        publish_json(&mock, "other", &ChassisVelocity::zero()).unwrap();

        assert_eq!(mock.published().len(), 2);
        assert_eq!(mock.last::<ChassisVelocity>("cmd"), Some(velocity));
        assert_eq!(mock.messages::<ChassisVelocity>("missing").len(), 0);
    }

    #[test]
    fn test_failing_mode() {
        let mock = MockTransport::new();
        mock.set_failing(true);
        assert!(mock.publish("cmd", vec![]).is_err());
        assert!(mock.published().is_empty());
    }
}
