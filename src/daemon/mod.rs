//! Daemon subsystem: the polling loop that keeps the integrity tree current,
//! and OS signal handling for graceful shutdown.

pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod signals;
