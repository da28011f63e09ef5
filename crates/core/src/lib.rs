//! Domain types shared by every veditor crate.
//!
//! Holds the [`JobRecord`](job::JobRecord) and its status state machine,
//! the effect parameters a user tunes before submission, and the media
//! files that travel with a job. Nothing in here performs network I/O.

pub mod config;
pub mod effects;
pub mod error;
pub mod job;
pub mod media;
pub mod types;
