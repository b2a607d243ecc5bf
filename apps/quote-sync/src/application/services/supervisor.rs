//! Connection Supervisor
//!
//! Owns the push connection: connects on the first subscribe (or an
//! explicit start), replays the current subscription set after every
//! handshake, forwards incremental subscribe/unsubscribe intents while
//! connected, detects failures through heartbeats and reconnects with
//! jittered exponential backoff.
//!
//! # Replay
//!
//! Intents that arrive while disconnected are absorbed. After a handshake
//! the queue is drained and a single batched subscribe is sent for
//! `current_subscription_set()`. Later intents are filtered against the
//! set of symbols actually sent upstream, so nothing is subscribed twice
//! and nothing is unsubscribed that was never sent.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::SyncState;
use crate::application::ports::{
    ClientCommand, PushConnection, PushConnector, PushEvent, TransportError,
};
use crate::domain::connection::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor};
use crate::domain::connection::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::connection::{ConnectionEvent, ConnectionFsm, ConnectionPhase, ConnectionState};
use crate::domain::quote::{QuoteRecord, Symbol};
use crate::infrastructure::metrics;

/// Upstream work requested by the hub or the ingest worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionIntent {
    /// Connect even if nothing is subscribed yet.
    Start,
    /// Symbols whose refcount went 0→1.
    Subscribe(Vec<Symbol>),
    /// Symbols whose debounce expired at refcount 0.
    Unsubscribe(Vec<Symbol>),
}

/// How a connected session ended.
enum SessionEnd {
    Failed(String),
    Shutdown,
}

/// Push connection supervisor task.
pub struct ConnectionSupervisor {
    state: Arc<SyncState>,
    connector: Arc<dyn PushConnector>,
    intents: mpsc::UnboundedReceiver<SubscriptionIntent>,
    observations: mpsc::Sender<QuoteRecord>,
    published: watch::Sender<ConnectionState>,
    fsm: ConnectionFsm,
    reconnect: ReconnectPolicy,
    heartbeat: HeartbeatConfig,
    upstream: BTreeSet<Symbol>,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    /// Create a supervisor in the `Disconnected` state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SyncState>,
        connector: Arc<dyn PushConnector>,
        intents: mpsc::UnboundedReceiver<SubscriptionIntent>,
        observations: mpsc::Sender<QuoteRecord>,
        published: watch::Sender<ConnectionState>,
        reconnect: ReconnectConfig,
        heartbeat: HeartbeatConfig,
        degraded_after: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state,
            connector,
            intents,
            observations,
            published,
            fsm: ConnectionFsm::new(degraded_after),
            reconnect: ReconnectPolicy::new(reconnect),
            heartbeat,
            upstream: BTreeSet::new(),
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        loop {
            let keep_going = match self.fsm.phase() {
                ConnectionPhase::Disconnected => self.await_start().await,
                ConnectionPhase::Connecting => self.connect().await,
                ConnectionPhase::Reconnecting => self.back_off().await,
                ConnectionPhase::Connected | ConnectionPhase::ShutDown => false,
            };

            if !keep_going {
                break;
            }
        }

        self.transition(ConnectionEvent::Shutdown);
        tracing::info!("Connection supervisor stopped");
    }

    /// Idle until a start or subscribe intent arrives.
    async fn await_start(&mut self) -> bool {
        loop {
            let intent = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                intent = self.intents.recv() => intent,
            };

            match intent {
                Some(SubscriptionIntent::Start | SubscriptionIntent::Subscribe(_)) => {
                    self.transition(ConnectionEvent::Start);
                    return true;
                }
                Some(SubscriptionIntent::Unsubscribe(_)) => {}
                None => return false,
            }
        }
    }

    async fn connect(&mut self) -> bool {
        let connector = Arc::clone(&self.connector);
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return false,
            result = connector.connect() => result,
        };

        match result {
            Ok(connection) => {
                self.transition(ConnectionEvent::Connected);
                self.reconnect.reset();

                match self.run_session(connection).await {
                    SessionEnd::Shutdown => false,
                    SessionEnd::Failed(reason) => {
                        tracing::warn!(reason = %reason, "Push connection lost");
                        metrics::record_transport_error("session");
                        self.transition(ConnectionEvent::Failed);
                        true
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Push handshake failed");
                metrics::record_transport_error("connect");
                self.transition(ConnectionEvent::Failed);
                true
            }
        }
    }

    /// Wait out the backoff delay, absorbing intents.
    async fn back_off(&mut self) -> bool {
        let Some(delay) = self.reconnect.next_delay() else {
            tracing::error!(
                attempts = self.reconnect.attempt_count(),
                "Reconnect attempts exhausted, waiting for a new start"
            );
            self.transition(ConnectionEvent::GiveUp);
            self.reconnect.reset();
            return true;
        };

        tracing::info!(
            attempt = self.reconnect.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting to push source"
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                () = &mut sleep => break,
                Some(_) = self.intents.recv() => {}
            }
        }

        metrics::record_reconnect();
        self.transition(ConnectionEvent::BackoffElapsed);
        true
    }

    async fn run_session(&mut self, mut connection: Box<dyn PushConnection>) -> SessionEnd {
        if let Err(e) = self.replay(connection.as_mut()).await {
            return SessionEnd::Failed(e.to_string());
        }

        let mut monitor = HeartbeatMonitor::new(&self.heartbeat);
        let period = self.heartbeat.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break SessionEnd::Shutdown,
                _ = ticker.tick() => match monitor.on_tick() {
                    HeartbeatEvent::SendPing => {
                        if let Err(e) = connection.send(ClientCommand::Ping).await {
                            break SessionEnd::Failed(e.to_string());
                        }
                    }
                    HeartbeatEvent::Timeout => {
                        break SessionEnd::Failed(format!(
                            "heartbeat timeout after {} silent intervals",
                            monitor.missed()
                        ));
                    }
                },
                intent = self.intents.recv() => {
                    let Some(intent) = intent else {
                        break SessionEnd::Shutdown;
                    };
                    if let Err(e) = self.forward_intent(connection.as_mut(), intent).await {
                        break SessionEnd::Failed(e.to_string());
                    }
                }
                event = connection.next_event() => match event {
                    Some(Ok(event)) => {
                        monitor.record_activity();
                        self.handle_event(event).await;
                    }
                    Some(Err(e)) => break SessionEnd::Failed(e.to_string()),
                    None => break SessionEnd::Failed("server closed connection".to_string()),
                },
            }
        };

        connection.close().await;
        self.upstream.clear();
        end
    }

    /// Send one batched subscribe for the current subscription set.
    async fn replay(&mut self, connection: &mut dyn PushConnection) -> Result<(), TransportError> {
        let mut discarded = 0_usize;
        while self.intents.try_recv().is_ok() {
            discarded += 1;
        }

        let set = self.state.multiplexer.lock().current_subscription_set();
        self.upstream.clear();

        tracing::info!(
            symbols = set.len(),
            discarded_intents = discarded,
            "Push connected, replaying subscriptions"
        );

        if set.is_empty() {
            return Ok(());
        }

        connection
            .send(ClientCommand::Subscribe(set.iter().cloned().collect()))
            .await?;
        self.upstream = set;
        Ok(())
    }

    async fn forward_intent(
        &mut self,
        connection: &mut dyn PushConnection,
        intent: SubscriptionIntent,
    ) -> Result<(), TransportError> {
        match intent {
            SubscriptionIntent::Start => Ok(()),
            SubscriptionIntent::Subscribe(symbols) => {
                let wanted = self.state.multiplexer.lock().current_subscription_set();
                let fresh: Vec<Symbol> = symbols
                    .into_iter()
                    .filter(|s| wanted.contains(s) && !self.upstream.contains(s))
                    .collect();
                if fresh.is_empty() {
                    return Ok(());
                }

                connection
                    .send(ClientCommand::Subscribe(fresh.clone()))
                    .await?;
                tracing::debug!(count = fresh.len(), "Subscribed upstream");
                self.upstream.extend(fresh);
                Ok(())
            }
            SubscriptionIntent::Unsubscribe(symbols) => {
                let wanted = self.state.multiplexer.lock().current_subscription_set();
                let stale: Vec<Symbol> = symbols
                    .into_iter()
                    .filter(|s| self.upstream.contains(s) && !wanted.contains(s))
                    .collect();
                if stale.is_empty() {
                    return Ok(());
                }

                connection
                    .send(ClientCommand::Unsubscribe(stale.clone()))
                    .await?;
                tracing::debug!(count = stale.len(), "Unsubscribed upstream");
                for symbol in &stale {
                    self.upstream.remove(symbol);
                }
                Ok(())
            }
        }
    }

    async fn handle_event(&self, event: PushEvent) {
        match event {
            PushEvent::Quote(record) => {
                metrics::record_observation_received(record.source());
                if self.observations.send(record).await.is_err() {
                    tracing::debug!("Ingest worker gone, dropping push quote");
                }
            }
            PushEvent::SubscriptionAck(symbols) => {
                tracing::debug!(count = symbols.len(), "Subscription acknowledged");
            }
            PushEvent::Heartbeat => {}
            PushEvent::Malformed(reason) => {
                tracing::warn!(reason = %reason, "Malformed push frame dropped");
                metrics::record_malformed_frame();
            }
        }
    }

    fn transition(&mut self, event: ConnectionEvent) {
        let from = self.fsm.state();
        match self.fsm.apply(event) {
            Ok(state) => {
                if state != from {
                    tracing::info!(
                        from = from.as_str(),
                        to = state.as_str(),
                        failures = self.fsm.consecutive_failures(),
                        "Connection state changed"
                    );
                }
                metrics::set_connection_state(state);
                self.published.send_replace(state);
            }
            Err(e) => tracing::error!(error = %e, "Rejected connection transition"),
        }
    }
}
