// Markboard state managers
// Managers own the dashboard's moving parts: the bookmark store, the initial fetch,
// the live change feed and identity resolution.

pub mod bookmark_store;
pub mod change_subscriber;
pub mod fetch_loader;
pub mod session_guard;
