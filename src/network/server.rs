//! Match Server
//!
//! Listens on one port per client slot, accepts exactly one connection on
//! each, and runs a single match between them. A fatal error in either
//! session stops both sessions and both listeners.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

use crate::config::ServerConfig;
use crate::game::apply::Game;
use crate::game::state::GameResult;
use crate::simulation::SimulatorSetting;
use super::channel::{Channel, ChannelConfig, ChannelError};
use super::session::{ClientId, Session, SessionEvent};

/// Depth of the session -> channel event queue.
const EVENT_QUEUE: usize = 64;

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind or query a listener.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// The match was torn down.
    #[error("Match aborted: {0}")]
    Channel(#[from] ChannelError),
}

/// A two-client match server.
pub struct Server {
    config: ServerConfig,
    game_id: String,
    simulator_setting: Box<dyn SimulatorSetting>,
    listeners: [TcpListener; 2],
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind both listening ports.
    pub async fn bind(
        config: ServerConfig,
        simulator_setting: Box<dyn SimulatorSetting>,
    ) -> Result<Self, ServerError> {
        let listener0 = TcpListener::bind(config.listen_addr(0)).await?;
        let listener1 = TcpListener::bind(config.listen_addr(1)).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let game_id = config.game_id_or_generate();

        Ok(Self {
            config,
            game_id,
            simulator_setting,
            listeners: [listener0, listener1],
            shutdown_tx,
        })
    }

    /// Bound addresses of client 0 and client 1.
    pub fn local_addrs(&self) -> Result<[SocketAddr; 2], ServerError> {
        Ok([self.listeners[0].local_addr()?, self.listeners[1].local_addr()?])
    }

    /// Match identifier.
    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    /// Play one match to completion.
    #[instrument(name = "match", skip(self), fields(game_id = %self.game_id))]
    pub async fn run(self) -> Result<GameResult, ServerError> {
        let span = Span::current();
        for (client, listener) in self.listeners.iter().enumerate() {
            if let Ok(addr) = listener.local_addr() {
                info!("Client {} listening on {}", client, addr);
            }
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let game = Game::new(self.config.game_setting, self.simulator_setting.as_ref(), self.config.seed);
        let channel = Channel::new(
            ChannelConfig {
                game_id: self.game_id.clone(),
                time_limit: self.config.time_limit,
                extra_time_limit: self.config.extra_time_limit,
            },
            game,
            events_rx,
            span.clone(),
        );

        let mut slots = Vec::with_capacity(2);
        for (client, listener) in self.listeners.into_iter().enumerate() {
            let task = serve_slot(client, listener, events_tx.clone(), self.shutdown_tx.subscribe());
            slots.push(tokio::spawn(task.instrument(span.clone())));
        }
        drop(events_tx);

        let result = channel.run().await;

        match &result {
            Ok(result) => info!(win = ?result.win, reason = ?result.reason, "Match finished"),
            Err(e) => {
                error!("Match aborted: {}", e);
                let _ = self.shutdown_tx.send(());
            }
        }

        for slot in slots {
            if let Err(e) = slot.await {
                warn!("Session task failed: {}", e);
            }
        }
        debug!("Server terminated");

        result.map_err(ServerError::from)
    }
}

/// Accept one client on `listener` and run its session.
async fn serve_slot(
    client: ClientId,
    listener: TcpListener,
    events: mpsc::Sender<SessionEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let stream = tokio::select! {
        accepted = listener.accept() => match accepted {
            Ok((stream, addr)) => {
                debug!("Client {} connected from {}", client, addr);
                stream
            }
            Err(e) => {
                error!("Accept error on client {}: {}", client, e);
                let _ = events.send(SessionEvent::Closed { client }).await;
                return;
            }
        },
        _ = shutdown_rx.recv() => {
            debug!("Client {} slot closed before contact", client);
            return;
        }
    };
    drop(listener);

    if let Err(e) = stream.set_nodelay(true) {
        debug!("set_nodelay failed on client {}: {}", client, e);
    }

    let (session, link) = Session::new(client, stream, events.clone(), shutdown_rx);
    if events.send(SessionEvent::Joined { client, link }).await.is_err() {
        return;
    }
    session.run().instrument(info_span!("session", client)).await;
}

// =============================================================================
// TESTS
// =============================================================================
