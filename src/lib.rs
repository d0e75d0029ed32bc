//! Library crate for sketch-guess-back, exposing modules for binaries and tests.

/// Runtime configuration.
pub mod config;
/// Persistence layer.
pub mod dao;
/// Wire payloads.
pub mod dto;
/// Service and HTTP errors.
pub mod error;
/// HTTP routes.
pub mod routes;
/// Room operations and transports.
pub mod services;
/// Shared state and game rules.
pub mod state;
