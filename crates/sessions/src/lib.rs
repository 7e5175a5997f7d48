//! Session and room lifecycle.
//!
//! The session manager owns the socket registry, the room registry and their
//! back-indices, and is the only place that mutates them. Lookup and the
//! following mutation always happen under one write-lock acquisition, so a
//! room can never outlive its members' registrations.

pub mod manager;
pub mod room;
pub mod user;

pub use {
    manager::{AttachedProfile, FindPartnerResult, SessionManager},
    room::Room,
    user::SessionUser,
};
