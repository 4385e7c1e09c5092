//! Library crate for playdesk-back, exposing modules for binaries and integration tests.

#[cfg(feature = "http-client")]
pub mod client;
pub mod clock;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod timer;
