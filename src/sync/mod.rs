//! Incremental synchronization: watermarks, snapshot diffing, the poll loop,
//! and the session that ties them together.

pub mod diff;
pub mod scheduler;
pub mod session;
pub mod watermark;
