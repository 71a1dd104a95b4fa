//! WebSocket transport between participants and the authority

pub mod handler;
pub mod protocol;
