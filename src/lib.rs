//! lanchat - a peer-hosted LAN chat room
//!
//! This crate provides the connection and relay core of lanchat:
//! - A line-oriented wire protocol
//! - The host side: a room that accepts participants, replays history and
//!   relays every chat line to everyone else
//! - The client side: a link that dials a host and surfaces what it sends
//!
//! # Architecture
//!
//! One participant hosts a [`server::Room`] on a TCP port; the others dial it
//! with a [`client::RemoteLink`]. Every blocking step (accept, line reads,
//! history storage) runs on its own task or thread, and everything worth
//! showing to the user arrives as an [`event::ChatEvent`] on an mpsc channel.

pub mod client;
pub mod config;
pub mod connection;
pub mod event;
pub mod history;
pub mod logger;
pub mod protocol;
pub mod server;
