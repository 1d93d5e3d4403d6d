//! Network Layer
//!
//! Newline-delimited JSON over TCP, one connection per client slot.
//! This layer is **non-deterministic**; all rules run through `game/`.

pub mod protocol;
pub mod session;
pub mod channel;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, IsReady, TeamInfo, Update, PROTOCOL_VERSION};
pub use session::{ClientId, Outgoing, Session, SessionEvent};
pub use channel::{Channel, ChannelConfig, ChannelError, ClientState};
pub use server::{Server, ServerError};
