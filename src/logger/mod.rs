//! Change logging: the engine's append-only change log and its optional
//! JSONL mirror with graceful degradation.

pub mod change_log;
pub mod jsonl;
