//! The HTTP/event gateway.
//!
//! One axum router carries both planes: the bidirectional event socket at
//! `/ws` and the friends/profile REST surface under `/api`. Payloads are
//! validated at the edge against the protocol schema descriptors; handlers
//! below the edge only see typed params.

pub mod friends_routes;
pub mod rate_limit;
pub mod server;
pub mod state;
pub mod ws;

pub use {
    server::{build_router, run},
    state::AppState,
};
