//! Long-running watch loop and its control inputs.

#[cfg(feature = "signals")]
pub mod signals;
pub mod watch;
