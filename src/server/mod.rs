//! Host side - accepts participants and relays their chat

mod listener;
mod room;
mod session;

pub use room::{Room, RoomError, RoomSettings, RoomState};
pub use session::{ClientSession, SessionError, SessionId, SessionInfo};
