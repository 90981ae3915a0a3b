use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::Arc;

use crate::db::VoteStore;
use crate::error::{Error, Result};
use crate::models::{Ballot, Member, Poll, PollType, Response};

/// Validates ballots and commits them as a single atomic unit.
pub struct VoteRecorder<S: ?Sized> {
    store: Arc<S>,
}

impl<S: VoteStore + ?Sized> VoteRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, poll: &Poll, member: &Member, ballot: &Ballot) -> Result<Vec<Response>> {
        self.submit_at(poll, member, ballot, Utc::now()).await
    }

    pub async fn submit_at(
        &self,
        poll: &Poll,
        member: &Member,
        ballot: &Ballot,
        now: DateTime<Utc>,
    ) -> Result<Vec<Response>> {
        let responses = match build_responses(poll, member, ballot, now) {
            Ok(responses) => responses,
            Err(e) => {
                warn!("Rejected ballot from {} on poll {}: {}", member.email, poll.id, e);
                return Err(e);
            }
        };

        // Uniqueness is left to the store so concurrent submissions are caught atomically.
        match self.store.commit_ballot(poll, &responses, now).await {
            Ok(()) => {
                info!(
                    "Recorded {} response(s) from {} on poll {}",
                    responses.len(),
                    member.email,
                    poll.id
                );
                Ok(responses)
            }
            Err(e) => {
                warn!("Ballot from {} on poll {} not committed: {}", member.email, poll.id, e);
                Err(e)
            }
        }
    }
}

/// Applies the pre-write guards in order and assigns scores.
///
/// The shape check compares lengths only. A correctly sized ballot that names
/// the same choice twice passes here and fails at commit with `DuplicateVote`
/// from the store's (member, choice) uniqueness, rolling back the whole ballot.
pub fn build_responses(
    poll: &Poll,
    member: &Member,
    ballot: &Ballot,
    now: DateTime<Utc>,
) -> Result<Vec<Response>> {
    if poll.is_finished_at(now) {
        return Err(Error::PollFinished(poll.id.clone()));
    }

    if member.group_id != poll.group_id {
        return Err(Error::invalid(
            "member",
            format!("{} is not a member of the poll's group", member.email),
        ));
    }

    if let Some(unknown) = ballot.choice_ids().find(|id| !poll.has_choice(id)) {
        return Err(Error::UnknownChoice {
            poll_id: poll.id.clone(),
            choice_id: unknown.clone(),
        });
    }

    let total = poll.choices.len();
    let shape_error = |reason: String| Error::InvalidBallotShape {
        poll_type: poll.poll_type,
        reason,
    };

    let responses = match (poll.poll_type, ballot) {
        (PollType::ChooseOne, Ballot::ChooseOne { choice }) => {
            vec![Response::new(choice.clone(), member.id.clone(), None)]
        }
        (PollType::BordaSingle, Ballot::BordaSingle { ranking }) => {
            if ranking.len() != total {
                return Err(shape_error(format!(
                    "ranking names {} choice(s) but the poll has {}",
                    ranking.len(),
                    total
                )));
            }
            let n = ranking.len() as i32;
            ranking
                .iter()
                .enumerate()
                .map(|(rank, choice_id)| {
                    Response::new(choice_id.clone(), member.id.clone(), Some(n - rank as i32 - 1))
                })
                .collect()
        }
        (PollType::BordaSplit, Ballot::BordaSplit { ranked, bottom }) => {
            if ranked.len() + bottom.len() != total {
                return Err(shape_error(format!(
                    "ranked and bottom name {} choice(s) but the poll has {}",
                    ranked.len() + bottom.len(),
                    total
                )));
            }
            let n = total as i32;
            let mut responses: Vec<Response> = ranked
                .iter()
                .enumerate()
                .map(|(rank, choice_id)| {
                    Response::new(choice_id.clone(), member.id.clone(), Some(n - rank as i32))
                })
                .collect();
            responses.extend(
                bottom
                    .iter()
                    .map(|choice_id| Response::new(choice_id.clone(), member.id.clone(), None)),
            );
            responses
        }
        (poll_type, _) => {
            return Err(shape_error(format!(
                "expected a {} ballot",
                poll_type
            )));
        }
    };

    Ok(responses)
}
