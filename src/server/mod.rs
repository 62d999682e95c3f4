// Submodules
pub mod auth;
pub mod handlers;
pub mod limit;
pub mod routes;
mod runtime;
pub mod state;

// Public API (what main.rs imports)
pub use routes::create_router;
pub use runtime::serve;
pub use state::AppState;
