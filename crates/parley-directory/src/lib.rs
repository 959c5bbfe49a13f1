//! User and room registry for Parley.
//!
//! The [`Directory`] is the only shared mutable state in the server. It
//! knows:
//!
//! 1. **Who is connected**: nick → callback address, plus the rooms each
//!    user has joined ([`User`]).
//! 2. **Which rooms exist**: a set of names. A room has no state beyond
//!    existing; its members are whoever lists it.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher (above)  ← reads and mutates the directory per request
//!     ↕
//! Directory (this crate)  ← atomic operations behind one lock
//! ```

mod directory;
mod error;
mod user;

pub use directory::Directory;
pub use error::DirectoryError;
pub use user::{Peer, User};
