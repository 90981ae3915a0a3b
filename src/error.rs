use thiserror::Error;

use crate::models::PollType;

pub type Result<T> = std::result::Result<T, Error>;

/// Faults surfaced to the web layer.
///
/// `PollFinished`, `DuplicateVote` and the ballot faults are things a voter can
/// cause and recover from. `PollNotFinished` and `UnsupportedPollType` mean the
/// caller asked for a tally it should never have asked for; see [`Error::is_misuse`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("poll {0} has already finished")]
    PollFinished(String),

    #[error("ballot does not match poll type {poll_type}: {reason}")]
    InvalidBallotShape { poll_type: PollType, reason: String },

    #[error("choice {choice_id} does not belong to poll {poll_id}")]
    UnknownChoice { poll_id: String, choice_id: String },

    #[error("member {member_id} already responded to choice {choice_id}")]
    DuplicateVote { member_id: String, choice_id: String },

    #[error("poll {0} is not finished")]
    PollNotFinished(String),

    #[error("{operation} does not support poll type {poll_type}")]
    UnsupportedPollType {
        poll_type: PollType,
        operation: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("creators ({0}) cannot be removed from their groups")]
    CreatorRemoval(String),

    #[error("{email} is already a member of group {group_id}")]
    DuplicateMember { group_id: String, email: String },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Programming faults: the request should be failed loudly, not shown to the user.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::PollNotFinished(_) | Error::UnsupportedPollType { .. }
        )
    }

    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PollFinished(_)
                | Error::DuplicateVote { .. }
                | Error::InvalidBallotShape { .. }
                | Error::UnknownChoice { .. }
                | Error::Invalid { .. }
                | Error::DuplicateMember { .. }
                | Error::CreatorRemoval(_)
        )
    }
}
