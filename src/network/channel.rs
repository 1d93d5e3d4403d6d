//! Match Channel
//!
//! Holds both clients of one match, walks each through the handshake,
//! sequences turns, keeps the thinking-time budgets and drives the rule
//! engine. Every protocol decision happens on the channel task; only the
//! physics run is handed to the blocking pool.
//!
//! Any protocol violation tears the whole match down.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn, Instrument, Span};

use crate::game::apply::Game;
use crate::game::moves::{Move, MoveResult};
use crate::game::state::{GameResult, TeamId};
use crate::simulation::SettingError;
use super::protocol::{
    ClientMessage, IsReady, ServerMessage, TeamInfo, Update, PROTOCOL_VERSION, RULE_NORMAL,
};
use super::session::{ClientId, Outgoing, SessionEvent};

/// Time allowed to answer `dc`.
pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-client protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not greeted yet.
    BeforeContact,
    /// `dc` sent, waiting for `dc_ok`.
    VersionCheck,
    /// `is_ready` sent, waiting for `ready_ok`.
    ReadyCheck,
    /// Ready, waiting for the opponent.
    NewGame,
    /// This client is on move.
    MyTurn,
    /// The opponent is on move.
    OpponentTurn,
    /// Match finished.
    GameOver,
}

/// Fatal match errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Message not valid in the client's state.
    #[error("client {client}: unexpected message in state {state:?} (expected {expected})")]
    UnexpectedMessage {
        /// Slot
        client: ClientId,
        /// State at the time
        state: ClientState,
        /// What was expected
        expected: &'static str,
    },

    /// Message could not be decoded.
    #[error("client {client}: invalid message: {source}")]
    Decode {
        /// Slot
        client: ClientId,
        /// Parser error
        source: serde_json::Error,
    },

    /// Client speaks another protocol version.
    #[error("client {client}: protocol version mismatch (got {got}, expected {})", PROTOCOL_VERSION)]
    VersionMismatch {
        /// Slot
        client: ClientId,
        /// Version sent by the client
        got: u32,
    },

    /// A shot that cannot be simulated or reported back.
    #[error("client {client}: invalid shot: {reason}")]
    InvalidShot {
        /// Slot
        client: ClientId,
        /// What is wrong with it
        reason: String,
    },

    /// A deadline fired outside the client's turn.
    #[error("client {client}: input timeout in state {state:?}")]
    UnexpectedTimeout {
        /// Slot
        client: ClientId,
        /// State at the time
        state: ClientState,
    },

    /// Connection lost before the match ended.
    #[error("client {client} left at an inappropriate time")]
    Disconnected {
        /// Slot
        client: ClientId,
    },

    /// No live session to write to.
    #[error("client {client}: message delivery failed")]
    DeliveryFailed {
        /// Slot
        client: ClientId,
    },

    /// Outgoing message could not be encoded.
    #[error("message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Simulator setting could not be encoded.
    #[error("simulator setting: {0}")]
    Setting(#[from] SettingError),

    /// Physics task died.
    #[error("simulation task failed: {0}")]
    Simulation(String),

    /// Every session is gone.
    #[error("all sessions closed")]
    SessionsClosed,
}

/// Static configuration of one channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Match identifier
    pub game_id: String,
    /// Thinking time for the regular ends
    pub time_limit: Duration,
    /// Thinking time per extra end
    pub extra_time_limit: Duration,
}

struct Client {
    id: ClientId,
    name: String,
    state: ClientState,
    remaining_time: Duration,
    link: Option<mpsc::Sender<Outgoing>>,
}

impl Client {
    fn new(id: ClientId, remaining_time: Duration) -> Self {
        Self {
            id,
            name: String::new(),
            state: ClientState::BeforeContact,
            remaining_time,
            link: None,
        }
    }
}

/// One match between two clients.
pub struct Channel {
    config: ChannelConfig,
    clients: [Client; 2],
    /// Taken while a shot is being simulated.
    game: Option<Game>,
    last_move_result: Option<MoveResult>,
    events: mpsc::Receiver<SessionEvent>,
    span: Span,
}

impl Channel {
    /// New channel. Log output goes to `span`.
    pub fn new(
        config: ChannelConfig,
        game: Game,
        events: mpsc::Receiver<SessionEvent>,
        span: Span,
    ) -> Self {
        let clients = [
            Client::new(0, config.time_limit),
            Client::new(1, config.time_limit),
        ];
        Self {
            config,
            clients,
            game: Some(game),
            last_move_result: None,
            events,
            span,
        }
    }

    /// Process session events until the match is decided.
    pub async fn run(mut self) -> Result<GameResult, ChannelError> {
        let span = self.span.clone();
        async move {
            loop {
                let event = self.events.recv().await.ok_or(ChannelError::SessionsClosed)?;
                if let Err(e) = self.handle_event(event).await {
                    error!("{}", e);
                    return Err(e);
                }
                if let Some(result) = self.result() {
                    debug!("Channel finished");
                    return Ok(result);
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Result once every client has been told the match is over.
    fn result(&self) -> Option<GameResult> {
        if self.clients.iter().any(|c| c.state != ClientState::GameOver) {
            return None;
        }
        self.game.as_ref().and_then(|g| g.state.game_result)
    }

    /// State of one client.
    pub fn client_state(&self, client: ClientId) -> ClientState {
        self.clients[client].state
    }

    /// Dispatch one session event.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<(), ChannelError> {
        match event {
            SessionEvent::Joined { client, link } => self.join(client, link).await,
            SessionEvent::Line { client, text, elapsed } => self.on_read(client, &text, elapsed).await,
            SessionEvent::InputTimeout { client } => self.on_input_timeout(client).await,
            SessionEvent::Closed { client } => self.leave(client),
        }
    }

    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================

    async fn join(&mut self, client: ClientId, link: mpsc::Sender<Outgoing>) -> Result<(), ChannelError> {
        debug!("Start contact with client {}", client);
        self.clients[client].link = Some(link);
        self.clients[client].state = ClientState::VersionCheck;

        let message = ServerMessage::Dc { version: PROTOCOL_VERSION }.to_json()?;
        if client == 0 {
            info!("{}", message);
        }
        self.deliver(client, message, Some(VERSION_CHECK_TIMEOUT)).await
    }

    fn leave(&mut self, client: ClientId) -> Result<(), ChannelError> {
        self.clients[client].link = None;
        debug!("Client {} left the channel", client);
        if self.clients[client].state != ClientState::GameOver {
            return Err(ChannelError::Disconnected { client });
        }
        Ok(())
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    #[instrument(skip(self, text), fields(state = ?self.clients[client].state))]
    async fn on_read(&mut self, client: ClientId, text: &str, elapsed: Duration) -> Result<(), ChannelError> {
        let state = self.clients[client].state;
        let expected = match state {
            ClientState::GameOver => {
                warn!("client {}'s message was ignored", client);
                return Ok(());
            }
            ClientState::VersionCheck => "dc_ok",
            ClientState::ReadyCheck => "ready_ok",
            ClientState::MyTurn => "move",
            ClientState::BeforeContact | ClientState::NewGame | ClientState::OpponentTurn => {
                return Err(ChannelError::UnexpectedMessage { client, state, expected: "nothing" });
            }
        };

        let message = ClientMessage::from_json(text)
            .map_err(|source| ChannelError::Decode { client, source })?;

        match (state, message) {
            (ClientState::VersionCheck, ClientMessage::DcOk { version }) => {
                if version != PROTOCOL_VERSION {
                    return Err(ChannelError::VersionMismatch { client, got: version });
                }
                self.clients[client].state = ClientState::ReadyCheck;
                self.deliver_is_ready(client).await
            }

            (ClientState::ReadyCheck, ClientMessage::ReadyOk { name }) => {
                self.clients[client].name = name;
                self.clients[client].state = ClientState::NewGame;
                if self.clients.iter().all(|c| c.state == ClientState::NewGame) {
                    self.deliver_new_game().await?;
                    self.deliver_update(None).await?;
                }
                Ok(())
            }

            (ClientState::MyTurn, ClientMessage::Move(mv)) => {
                match mv {
                    Move::TimeLimit => {
                        return Err(ChannelError::UnexpectedMessage { client, state, expected: "shot or concede" });
                    }
                    Move::Shot(shot) if !shot.velocity.is_finite() => {
                        return Err(ChannelError::InvalidShot {
                            client,
                            reason: format!("velocity {} is not finite", shot.velocity),
                        });
                    }
                    Move::Shot(_) | Move::Concede => {}
                }
                let c = &mut self.clients[client];
                c.remaining_time = c.remaining_time.saturating_sub(elapsed);
                self.play(mv).await
            }

            _ => Err(ChannelError::UnexpectedMessage { client, state, expected }),
        }
    }

    async fn on_input_timeout(&mut self, client: ClientId) -> Result<(), ChannelError> {
        let state = self.clients[client].state;
        if state != ClientState::MyTurn {
            return Err(ChannelError::UnexpectedTimeout { client, state });
        }
        debug!("Client {} timed out", client);
        self.clients[client].remaining_time = Duration::ZERO;
        self.play(Move::TimeLimit).await
    }

    // =========================================================================
    // TURN PROCESSING
    // =========================================================================

    /// Apply a move and tell both clients.
    async fn play(&mut self, mv: Move) -> Result<(), ChannelError> {
        let mv = self.update(mv).await?;
        self.deliver_update(Some(mv)).await?;
        if self.game_state_over() {
            self.deliver_game_over().await?;
        }
        Ok(())
    }

    fn game_state_over(&self) -> bool {
        self.game.as_ref().is_some_and(|g| g.state.is_over())
    }

    fn current_client(&self) -> ClientId {
        self.game
            .as_ref()
            .map_or(0, |g| g.state.current_team().index())
    }

    /// Run the rule engine off the reactor. Returns the move as simulated.
    async fn update(&mut self, mut mv: Move) -> Result<Move, ChannelError> {
        let current = self.current_client();
        if self.clients[current].remaining_time.is_zero() {
            debug!("Client {} lost the game because of the time limit", current);
            mv = Move::TimeLimit;
        }

        let mut record = serde_json::to_value(mv)?;
        record["cmd"] = json!("move");
        record["team"] = json!(current);
        info!("{}", record);

        let mut game = self
            .game
            .take()
            .ok_or_else(|| ChannelError::Simulation("game state unavailable".into()))?;
        let span = Span::current();
        let (game, mv, result) = tokio::task::spawn_blocking(move || {
            span.in_scope(|| {
                let result = game.apply(&mut mv);
                (game, mv, result)
            })
        })
        .await
        .map_err(|e| ChannelError::Simulation(e.to_string()))?;

        let new_extra_end = game.state.current_end >= game.setting.end && game.state.current_shot == 0;
        self.game = Some(game);
        self.last_move_result = result;

        if new_extra_end {
            for client in &mut self.clients {
                client.remaining_time = self.config.extra_time_limit;
            }
        }

        Ok(mv)
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    async fn deliver(
        &mut self,
        client: ClientId,
        message: String,
        input_timeout: Option<Duration>,
    ) -> Result<(), ChannelError> {
        let link = self.clients[client]
            .link
            .as_ref()
            .ok_or(ChannelError::DeliveryFailed { client })?;
        link.send(Outgoing { text: message, input_timeout })
            .await
            .map_err(|_| ChannelError::DeliveryFailed { client })
    }

    async fn deliver_is_ready(&mut self, client: ClientId) -> Result<(), ChannelError> {
        let (game_setting, simulator_setting) = match &self.game {
            Some(game) => (game.setting, game.simulator.setting().to_json()?),
            None => return Err(ChannelError::Simulation("game state unavailable".into())),
        };

        let message = ServerMessage::IsReady(IsReady {
            game_id: self.config.game_id.clone(),
            rule: RULE_NORMAL.to_string(),
            game_setting,
            simulator_setting,
            team_id: TeamId::from_index(client),
            time_limit: self.config.time_limit.as_secs_f64(),
            extra_time_limit: self.config.extra_time_limit.as_secs_f64(),
        })
        .to_json()?;

        if client == 0 {
            info!("{}", message);
        }
        self.deliver(client, message, None).await
    }

    async fn deliver_new_game(&mut self) -> Result<(), ChannelError> {
        let teams = [
            TeamInfo { name: self.clients[0].name.clone() },
            TeamInfo { name: self.clients[1].name.clone() },
        ];
        let message = ServerMessage::NewGame { teams }.to_json()?;
        info!("{}", message);
        for client in 0..self.clients.len() {
            self.deliver(client, message.clone(), None).await?;
        }
        Ok(())
    }

    async fn deliver_update(&mut self, last_move: Option<Move>) -> Result<(), ChannelError> {
        let Some(game) = self.game.as_ref() else {
            return Err(ChannelError::Simulation("game state unavailable".into()));
        };
        let state = game.state.clone();
        let over = state.is_over();

        let next = state.current_team().index();
        let opponent = 1 - next;
        self.clients[next].state = ClientState::MyTurn;
        self.clients[opponent].state = ClientState::OpponentTurn;

        let message = ServerMessage::Update(Box::new(Update {
            state,
            remaining_times: [
                self.clients[0].remaining_time.as_secs_f64(),
                self.clients[1].remaining_time.as_secs_f64(),
            ],
            last_move,
            last_move_result: self.last_move_result.clone(),
        }))
        .to_json()?;

        info!("{}", message);

        // No deadline once the match is decided; game_over follows
        let timeout = (!over).then_some(self.clients[next].remaining_time);
        self.deliver(next, message.clone(), timeout).await?;
        self.deliver(opponent, message, None).await
    }

    async fn deliver_game_over(&mut self) -> Result<(), ChannelError> {
        for client in &mut self.clients {
            client.state = ClientState::GameOver;
        }
        let message = ServerMessage::GameOver.to_json()?;
        info!("{}", message);
        for client in 0..self.clients.len() {
            self.deliver(client, message.clone(), None).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("remaining_time", &self.remaining_time)
            .field("connected", &self.link.is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
