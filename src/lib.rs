//! Async client for the [Source RCON protocol](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol)
//! with a full-screen interactive console.
pub mod auth;
pub mod cli;
pub mod console;
pub mod error;
pub mod logging;
pub mod packet;
pub mod password;
pub mod session;
pub mod stream;
pub mod transport;
