/*!
Broker push simulé pour tester une session sans MQTT

`MockBroker` joue le rôle du serveur : il accepte ou refuse les connexions,
livre des messages au lien courant et peut couper ce lien. Chaque
`MockPushTransport` créé par `transport()` s'y connecte comme le ferait le
transport MQTT réel.
*/

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_live::{DashboardError, PushTransport, UnitStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub delivered: bool,
}

enum Signal {
    Payload(Vec<u8>),
    Drop,
}

#[derive(Default)]
struct BrokerState {
    link: Option<(u64, mpsc::UnboundedSender<Signal>)>,
    next_link_id: u64,
    refuse_next: usize,
    connect_attempts: usize,
    subscriptions: Vec<String>,
    published: Vec<MockMessage>,
}

#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport à donner à la session.
    pub fn transport(&self) -> MockPushTransport {
        MockPushTransport { broker: self.clone(), link: None }
    }

    /// Les `n` prochaines tentatives de connexion échouent.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().refuse_next = n;
    }

    /// Publie sur le topic ; false si aucun abonné n'est connecté (message perdu).
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        let subscribed = state.subscriptions.last().is_some_and(|t| t == topic);
        let delivered = match &state.link {
            Some((_, tx)) if subscribed => tx.send(Signal::Payload(payload.clone())).is_ok(),
            _ => false,
        };
        state.published.push(MockMessage { topic: topic.to_string(), payload, delivered });
        log::info!("[MOCK] published on {topic} (delivered: {delivered})");
        delivered
    }

    pub fn publish_json(&self, topic: &str, value: &Value) -> bool {
        self.publish(topic, value.to_string().into_bytes())
    }

    /// Coupe le lien courant comme une perte réseau.
    pub fn drop_connection(&self) {
        if let Some((_, tx)) = self.state.lock().link.take() {
            let _ = tx.send(Signal::Drop);
            log::info!("[MOCK] connection dropped");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().link.as_ref().is_some_and(|(_, tx)| !tx.is_closed())
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<MockMessage> {
        self.state.lock().published.clone()
    }
}

pub struct MockPushTransport {
    broker: MockBroker,
    link: Option<(u64, mpsc::UnboundedReceiver<Signal>)>,
}

#[async_trait]
impl PushTransport for MockPushTransport {
    async fn connect(&mut self, topic: &str) -> Result<(), DashboardError> {
        self.close().await;
        let mut state = self.broker.state.lock();
        state.connect_attempts += 1;
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(DashboardError::Transport("mock broker refused connection".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_link_id;
        state.next_link_id += 1;
        state.link = Some((id, tx));
        state.subscriptions.push(topic.to_string());
        self.link = Some((id, rx));
        log::info!("[MOCK] subscribed to {topic}");
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Vec<u8>, DashboardError> {
        let Some((_, rx)) = self.link.as_mut() else {
            return Err(DashboardError::Transport("mock link not connected".into()));
        };
        match rx.recv().await {
            Some(Signal::Payload(payload)) => Ok(payload),
            Some(Signal::Drop) | None => {
                self.link = None;
                Err(DashboardError::Transport("mock link dropped".into()))
            }
        }
    }

    async fn close(&mut self) {
        if let Some((id, _)) = self.link.take() {
            let mut state = self.broker.state.lock();
            if state.link.as_ref().is_some_and(|(current, _)| *current == id) {
                state.link = None;
            }
        }
    }
}

/// Messages au format du serveur de parking.
pub struct ParkingMessageBuilder;

impl ParkingMessageBuilder {
    /// Notification push `{spotId, status, timestamp}`.
    pub fn push_update(spot_id: &str, status: UnitStatus, at: DateTime<Utc>) -> Value {
        serde_json::json!({
            "spotId": spot_id,
            "status": status.as_wire(),
            "timestamp": at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        })
    }

    /// Même notification avec un horodatage local sans zone, comme l'émet le serveur.
    pub fn push_update_local(spot_id: i64, status: UnitStatus, at: DateTime<Utc>) -> Value {
        serde_json::json!({
            "spotId": spot_id,
            "status": status.as_wire(),
            "timestamp": at.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broker_delivers_to_subscriber() {
        let broker = MockBroker::new();
        let mut transport = broker.transport();
        transport.connect("/topic/parking-updates").await.unwrap();
        assert!(broker.is_connected());
        assert_eq!(broker.subscriptions(), vec!["/topic/parking-updates"]);

        let msg = ParkingMessageBuilder::push_update("A1", UnitStatus::Free, Utc::now());
        assert!(broker.publish_json("/topic/parking-updates", &msg));
        let payload = transport.next_message().await.unwrap();
        let parsed: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(parsed["spotId"], "A1");

        assert!(!broker.publish("other/topic", b"{}".to_vec()));

        let published = broker.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].topic, "/topic/parking-updates");
        assert_eq!(published[0].payload, msg.to_string().into_bytes());
        assert!(published[0].delivered);
        assert_eq!(published[1].topic, "other/topic");
        assert!(!published[1].delivered);
    }

    #[tokio::test]
    async fn test_drop_and_refuse() {
        let broker = MockBroker::new();
        let mut transport = broker.transport();
        transport.connect("t").await.unwrap();
        broker.drop_connection();
        assert!(transport.next_message().await.is_err());
        assert!(!broker.publish("t", b"{}".to_vec()));

        broker.fail_next_connects(1);
        assert!(transport.connect("t").await.is_err());
        assert!(transport.connect("t").await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }

    #[test]
    fn test_local_timestamp_builder() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.250Z").unwrap().with_timezone(&Utc);
        let msg = ParkingMessageBuilder::push_update_local(7, UnitStatus::OutOfService, at);
        assert_eq!(msg["spotId"], 7);
        assert_eq!(msg["status"], "OUT_OF_SERVICE");
        assert_eq!(msg["timestamp"], "2024-05-01T10:00:00.250");
    }
}
