//! Vote recording and tallying for group polls.
//!
//! A web layer decodes ballots into [`models::Ballot`] and hands them to
//! [`handlers::vote::VoteRecorder`]; once a poll has finished, the functions in
//! [`voting`] turn its stored responses into scores, counts and a per-member
//! breakdown.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod tasks;
pub mod voting;

pub use error::{Error, Result};
