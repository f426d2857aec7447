//! Core conversation components
//!
//! Sessions hold the transcript and talk to the collaborators; the store keeps
//! them addressable by id for the HTTP layer.

mod session;
mod store;

pub use session::{Exchange, FailurePolicy, Reply, Session, SessionError, SessionState};
pub use store::{SessionFactory, SessionHandle, SessionStore};
