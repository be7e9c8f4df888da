/**
 * PUSH CHANNEL MANAGER - Cycle de vie d'un abonnement à un topic
 *
 * RÔLE :
 * Connecte le transport, s'abonne à un topic unique, relaie chaque message
 * au propriétaire, détecte les coupures et se reconnecte avec backoff.
 *
 * FONCTIONNEMENT :
 * - Un seul worker tokio par manager : `connect()` pendant qu'il vit est un no-op
 * - Chaque transition d'état est publiée comme `PushEvent::State`
 * - Les erreurs de transport ne sont jamais remontées : elles déclenchent la
 *   reconnexion, sans limite du nombre d'essais
 * - `disconnect()` signale l'arrêt, attend la fermeture du transport et
 *   annule le timer de reconnexion en attente ; idempotent
 */

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::DashboardError;
use crate::health::{LinkStats, LinkTracker};
use crate::models::ConnectionState;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Transport publish/subscribe. Une connexion = connexion + abonnement au
/// topic ; `next_message` rend une erreur quand le lien tombe.
#[async_trait]
pub trait PushTransport: Send {
    async fn connect(&mut self, topic: &str) -> Result<(), DashboardError>;
    async fn next_message(&mut self) -> Result<Vec<u8>, DashboardError>;
    async fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    State(ConnectionState),
    Message(Vec<u8>),
    ReconnectScheduled { attempt: u32, delay: Duration },
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

pub struct PushChannelManager {
    transport: Arc<Mutex<Box<dyn PushTransport>>>,
    topic: String,
    backoff: BackoffConfig,
    events: mpsc::UnboundedSender<PushEvent>,
    tracker: LinkTracker,
    worker: Option<Worker>,
}

impl PushChannelManager {
    pub fn new(
        transport: Box<dyn PushTransport>,
        topic: impl Into<String>,
        backoff: BackoffConfig,
        events: mpsc::UnboundedSender<PushEvent>,
    ) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            topic: topic.into(),
            backoff,
            events,
            tracker: LinkTracker::new(),
            worker: None,
        }
    }

    pub fn connect(&mut self) {
        if let Some(worker) = &self.worker {
            if !worker.handle.is_finished() {
                debug!(topic = %self.topic, "push channel already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let link = Link {
            transport: self.transport.clone(),
            topic: self.topic.clone(),
            backoff: Backoff::new(self.backoff.clone()),
            events: self.events.clone(),
            tracker: self.tracker.clone(),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(link.run());
        self.worker = Some(Worker { handle, shutdown: shutdown_tx });
    }

    pub async fn disconnect(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.shutdown.send(true);
            if let Err(e) = worker.handle.await {
                warn!(error = %e, "push worker ended abnormally");
            }
        }
        if self.tracker.set_state(ConnectionState::Disconnected) {
            let _ = self.events.send(PushEvent::State(ConnectionState::Disconnected));
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    pub fn stats(&self) -> LinkStats {
        self.tracker.stats()
    }

    /// Tracker partagé avec le worker, pour lire l'état hors de la session.
    pub fn tracker(&self) -> LinkTracker {
        self.tracker.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.handle.is_finished())
    }
}

struct Link {
    transport: Arc<Mutex<Box<dyn PushTransport>>>,
    topic: String,
    backoff: Backoff,
    events: mpsc::UnboundedSender<PushEvent>,
    tracker: LinkTracker,
    shutdown: watch::Receiver<bool>,
}

impl Link {
    async fn run(mut self) {
        let transport = self.transport.clone();
        let mut transport = transport.lock().await;

        'session: loop {
            if !self.transition(ConnectionState::Connecting) {
                break;
            }

            let connected = tokio::select! {
                res = transport.connect(&self.topic) => res,
                _ = stopped(&mut self.shutdown) => break 'session,
            };

            match connected {
                Ok(()) => {
                    self.backoff.reset();
                    info!(topic = %self.topic, "push channel subscribed");
                    if !self.transition(ConnectionState::Connected) {
                        break;
                    }
                    loop {
                        let next = tokio::select! {
                            msg = transport.next_message() => msg,
                            _ = stopped(&mut self.shutdown) => break 'session,
                        };
                        match next {
                            Ok(payload) => {
                                self.tracker.mark_message();
                                if self.events.send(PushEvent::Message(payload)).is_err() {
                                    break 'session;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "push channel dropped");
                                break;
                            }
                        }
                    }
                    transport.close().await;
                }
                Err(e) => warn!(topic = %self.topic, error = %e, "push connect failed"),
            }

            if !self.transition(ConnectionState::Disconnected) {
                break;
            }

            let delay = self.backoff.next_delay();
            let attempt = self.tracker.increment_reconnects();
            debug!(attempt, delay_ms = delay.as_millis() as u64, "push reconnect scheduled");
            if self.events.send(PushEvent::ReconnectScheduled { attempt, delay }).is_err() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stopped(&mut self.shutdown) => break 'session,
            }
        }

        transport.close().await;
        debug!(topic = %self.topic, "push worker stopped");
    }

    /// Publie la transition ; false si le propriétaire a disparu.
    fn transition(&self, next: ConnectionState) -> bool {
        if self.tracker.set_state(next) {
            return self.events.send(PushEvent::State(next)).is_ok();
        }
        !self.events.is_closed()
    }
}

/// Se résout quand l'arrêt est demandé ou que le manager a été détruit.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
