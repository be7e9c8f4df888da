use crate::config::PushConf;
use crate::error::DashboardError;
use crate::push::PushTransport;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, QoS, SubscribeReasonCode};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Transport push sur broker MQTT. La reconnexion automatique de l'event loop
/// rumqttc n'est pas utilisée : sur erreur on jette le lien et c'est le
/// `PushChannelManager` qui décide quand recommencer.
pub struct MqttTransport {
    options: MqttOptions,
    link: Option<(AsyncClient, EventLoop)>,
    topic: String,
    backlog: VecDeque<Vec<u8>>,
}

impl MqttTransport {
    pub fn new(conf: &PushConf) -> Self {
        let mut opts = MqttOptions::new(conf.client_id(), &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(conf.keep_alive_secs.max(5)));
        opts.set_clean_session(true);
        Self::with_options(opts)
    }

    pub fn with_options(options: MqttOptions) -> Self {
        Self { options, link: None, topic: String::new(), backlog: VecDeque::new() }
    }

    async fn handshake(&mut self, topic: &str) -> Result<(AsyncClient, EventLoop), DashboardError> {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 10);

        loop {
            if let Event::Incoming(Incoming::ConnAck(ack)) = eventloop.poll().await? {
                if ack.code != ConnectReturnCode::Success {
                    return Err(DashboardError::Transport(format!("broker refused connection: {:?}", ack.code)));
                }
                break;
            }
        }

        client.subscribe(topic, QoS::AtLeastOnce).await?;
        loop {
            match eventloop.poll().await? {
                Event::Incoming(Incoming::SubAck(ack)) => {
                    if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
                        return Err(DashboardError::Transport(format!("subscription to {topic} rejected")));
                    }
                    break;
                }
                Event::Incoming(Incoming::Publish(p)) if p.topic == topic => {
                    self.backlog.push_back(p.payload.to_vec());
                }
                _ => {}
            }
        }

        Ok((client, eventloop))
    }
}

#[async_trait]
impl PushTransport for MqttTransport {
    async fn connect(&mut self, topic: &str) -> Result<(), DashboardError> {
        self.close().await;
        let link = timeout(HANDSHAKE_TIMEOUT, self.handshake(topic))
            .await
            .map_err(|_| DashboardError::Transport("mqtt handshake timed out".into()))??;
        self.link = Some(link);
        self.topic = topic.to_string();
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Vec<u8>, DashboardError> {
        if let Some(payload) = self.backlog.pop_front() {
            return Ok(payload);
        }
        let Some((_, eventloop)) = self.link.as_mut() else {
            return Err(DashboardError::Transport("mqtt link not connected".into()));
        };
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == self.topic => {
                    return Ok(p.payload.to_vec());
                }
                Ok(Event::Incoming(Incoming::Disconnect)) => {
                    self.link = None;
                    return Err(DashboardError::Transport("broker closed the session".into()));
                }
                Ok(_) => {}
                Err(e) => {
                    self.link = None;
                    return Err(e.into());
                }
            }
        }
    }

    async fn close(&mut self) {
        self.backlog.clear();
        if let Some((client, mut eventloop)) = self.link.take() {
            if client.disconnect().await.is_ok() {
                // laisse l'event loop envoyer le DISCONNECT
                let _ = timeout(CLOSE_GRACE, eventloop.poll()).await;
            }
            debug!(topic = %self.topic, "mqtt link closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_next_message_without_link_is_transport_error() {
        let mut transport = MqttTransport::new(&PushConf::default());
        let err = transport.next_message().await.unwrap_err();
        assert!(matches!(err, DashboardError::Transport(_)));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_fast() {
        let conf = PushConf { host: "127.0.0.1".into(), port: 1, ..PushConf::default() };
        let mut transport = MqttTransport::new(&conf);
        let err = transport.connect("/topic/parking-updates").await.unwrap_err();
        assert!(matches!(err, DashboardError::Transport(_)));
    }
}
