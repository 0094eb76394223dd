//! CLI command implementations.

pub mod add;
pub mod categories;
pub mod list;
pub mod random;
pub mod remote;
pub mod sync;
pub mod watch;
