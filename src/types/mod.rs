// Markboard shared type definitions
// Each submodule defines types used across the application.

pub mod bookmark;
pub mod change;
pub mod config;
pub mod errors;
pub mod session;
pub mod view;
