//! Markboard: a minimal personal bookmark manager client with live sync.
//!
//! This library crate exposes all modules for use by the RPC binary and integration tests.

pub mod app;
#[cfg(feature = "local")]
pub mod database;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
