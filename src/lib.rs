//! Wireline - a small, strict HTTP/1.1 server
//!
//! Core library for the protocol layer, configuration and the accept loop.

pub mod config;
pub mod http;
pub mod logging;
pub mod server;
