use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::db::VoteStore;
use crate::error::{Error, Result};
use crate::models::{Poll, Response};

/// In-process store with the same uniqueness and all-or-nothing rules as [`super::Database`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    responses: Mutex<Vec<Response>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn commit_ballot(
        &self,
        poll: &Poll,
        responses: &[Response],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut stored = self
            .responses
            .lock()
            .map_err(|_| Error::Corrupt("response store lock poisoned".to_string()))?;

        if poll.is_finished_at(now) {
            return Err(Error::PollFinished(poll.id.clone()));
        }

        let mut taken: HashSet<(&str, &str)> = stored
            .iter()
            .map(|r| (r.member_id.as_str(), r.choice_id.as_str()))
            .collect();
        for response in responses {
            if !taken.insert((response.member_id.as_str(), response.choice_id.as_str())) {
                return Err(Error::DuplicateVote {
                    member_id: response.member_id.clone(),
                    choice_id: response.choice_id.clone(),
                });
            }
        }

        stored.extend_from_slice(responses);
        Ok(())
    }

    async fn poll_responses(&self, poll: &Poll) -> Result<Vec<Response>> {
        let stored = self
            .responses
            .lock()
            .map_err(|_| Error::Corrupt("response store lock poisoned".to_string()))?;
        Ok(stored
            .iter()
            .filter(|r| poll.has_choice(&r.choice_id))
            .cloned()
            .collect())
    }
}
