use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::{Member, Poll, Response};
use crate::voting::{assert_finished, poll_responses};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownEntry {
    pub member: Member,
    pub score: Option<i32>,
}

/// Per-member detail of a finished poll.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Breakdown {
    /// Choice id to every (member, score) that named it. No ordering within a list.
    pub by_choice: HashMap<String, Vec<BreakdownEntry>>,
    /// Group members with no response at all on this poll.
    pub unresponded: Vec<Member>,
}

impl Breakdown {
    pub fn entries_for(&self, choice_id: &str) -> &[BreakdownEntry] {
        self.by_choice
            .get(choice_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entry_count(&self) -> usize {
        self.by_choice.values().map(Vec::len).sum()
    }
}

/// `members` should be the poll's group; members of other groups are skipped.
pub fn calculate(poll: &Poll, members: &[Member], responses: &[Response]) -> Result<Breakdown> {
    assert_finished(poll)?;

    let responses = poll_responses(poll, responses);
    let mut by_member: HashMap<&str, Vec<&Response>> = HashMap::new();
    for response in &responses {
        by_member
            .entry(response.member_id.as_str())
            .or_default()
            .push(response);
    }

    let mut breakdown = Breakdown::default();
    let mut seen = HashSet::new();
    for member in members {
        if member.group_id != poll.group_id || !seen.insert(member.id.as_str()) {
            continue;
        }
        match by_member.get(member.id.as_str()) {
            Some(member_responses) => {
                for response in member_responses {
                    breakdown
                        .by_choice
                        .entry(response.choice_id.clone())
                        .or_default()
                        .push(BreakdownEntry {
                            member: member.clone(),
                            score: response.score,
                        });
                }
            }
            None => breakdown.unresponded.push(member.clone()),
        }
    }

    Ok(breakdown)
}
