//! Session module - conversation history and shared state
//!
//! The store owns every session; scopes decide whether an executing agent
//! writes to it directly or into an isolated branch overlay.

pub mod scope;
pub mod store;

pub use scope::{BranchState, StateScope};
pub use store::{SessionState, SessionStore};
