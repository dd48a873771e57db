//! A multiplayer roguelike served over telnet.
//!
//! Connections are negotiated by [`transport`], rendered through the
//! double-buffered [`screen`], and driven by the tick-based [`game`].

pub mod app;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod game;
pub mod screen;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod world;
