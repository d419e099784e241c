//! Change monitoring: raw event source, classification, and the rebuild
//! trigger that keeps the integrity tree in step with the filesystem.

pub mod engine;
pub mod events;
pub mod observer;
