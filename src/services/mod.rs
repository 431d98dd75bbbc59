// Markboard services
// Backends (hosted and local), the realtime channel client, config and session persistence.

pub mod backend;
pub mod config_engine;
#[cfg(feature = "local")]
pub mod local_backend;
#[cfg(feature = "supabase")]
pub mod realtime;
pub mod session_store;
#[cfg(feature = "supabase")]
pub mod supabase;
