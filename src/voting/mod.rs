pub mod breakdown;
pub mod counts;
pub mod scores;

use serde::Serialize;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{Member, Poll, PollType, Response};

pub use breakdown::{Breakdown, BreakdownEntry};

/// Per-choice reduction of a set of responses.
///
/// Each choice maps to the sum of `f(response)` over its responses; with the
/// default extractor that is a plain count. Choices nobody responded to are
/// absent, so callers must read a missing entry as zero.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    totals: HashMap<String, i64>,
}

impl ResultAggregator {
    pub fn counts(responses: &[Response]) -> Self {
        Self::sum_by(responses, |_| 1)
    }

    pub fn sum_by<F>(responses: &[Response], f: F) -> Self
    where
        F: Fn(&Response) -> i64,
    {
        let mut totals: HashMap<String, i64> = HashMap::new();
        for response in responses {
            *totals.entry(response.choice_id.clone()).or_insert(0) += f(response);
        }
        Self { totals }
    }

    /// Score sums, with unscored responses contributing 0.
    pub fn scores(responses: &[Response]) -> Self {
        Self::sum_by(responses, |response| response.score.map_or(0, i64::from))
    }

    pub fn get(&self, choice_id: &str) -> Option<i64> {
        self.totals.get(choice_id).copied()
    }

    pub fn get_or_zero(&self, choice_id: &str) -> i64 {
        self.get(choice_id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Unordered export; ordering is up to the caller.
    pub fn to_vec(&self) -> Vec<(String, i64)> {
        self.totals
            .iter()
            .map(|(choice_id, total)| (choice_id.clone(), *total))
            .collect()
    }
}

// Structure to hold one ranked line of a tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceResult {
    pub choice_id: String,
    pub choice_text: String,
    pub score: i64,
    pub votes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TallyReport {
    pub poll_id: String,
    pub title: String,
    pub poll_type: PollType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<ChoiceResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<Vec<ChoiceResult>>,
    pub breakdown: Breakdown,
}

/// Runs every tally the poll's type supports.
pub fn report(poll: &Poll, members: &[Member], responses: &[Response]) -> Result<TallyReport> {
    let (scores, counts) = match poll.poll_type {
        PollType::ChooseOne => (None, Some(counts::calculate(poll, responses)?)),
        PollType::BordaSingle => (Some(scores::calculate(poll, responses)?), None),
        PollType::BordaSplit => (
            Some(scores::calculate(poll, responses)?),
            Some(counts::calculate(poll, responses)?),
        ),
    };

    Ok(TallyReport {
        poll_id: poll.id.clone(),
        title: poll.title.clone(),
        poll_type: poll.poll_type,
        scores,
        counts,
        breakdown: breakdown::calculate(poll, members, responses)?,
    })
}

pub(crate) fn assert_finished(poll: &Poll) -> Result<()> {
    if poll.is_finished() {
        Ok(())
    } else {
        Err(Error::PollNotFinished(poll.id.clone()))
    }
}

pub(crate) fn unsupported(poll: &Poll, operation: &'static str) -> Error {
    Error::UnsupportedPollType {
        poll_type: poll.poll_type,
        operation,
    }
}

/// Responses that name one of this poll's choices.
pub(crate) fn poll_responses(poll: &Poll, responses: &[Response]) -> Vec<Response> {
    responses
        .iter()
        .filter(|response| poll.has_choice(&response.choice_id))
        .cloned()
        .collect()
}

/// Builds result lines for every aggregated choice, in poll order, ready for a
/// stable sort by the caller.
pub(crate) fn result_lines(
    poll: &Poll,
    scores: &ResultAggregator,
    counts: &ResultAggregator,
) -> Vec<ChoiceResult> {
    poll.choices
        .iter()
        .filter(|choice| counts.get(&choice.id).is_some())
        .map(|choice| ChoiceResult {
            choice_id: choice.id.clone(),
            choice_text: choice.text.clone(),
            score: scores.get_or_zero(&choice.id),
            votes: counts.get_or_zero(&choice.id),
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn aggregator_counts_by_default() {
        let poll = finished_poll(PollType::ChooseOne, &["a", "b", "c"]);
        let voters = members(3);
        let responses = vec![
            response(&poll, 0, &voters[0], None),
            response(&poll, 0, &voters[1], None),
            response(&poll, 1, &voters[2], None),
        ];

        let counts = ResultAggregator::counts(&responses);
        assert_eq!(counts.get(&poll.choices[0].id), Some(2));
        assert_eq!(counts.get(&poll.choices[1].id), Some(1));
        assert_eq!(counts.get(&poll.choices[2].id), None);
        assert_eq!(counts.get_or_zero(&poll.choices[2].id), 0);
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn aggregator_sums_scores_treating_absent_as_zero() {
        let poll = finished_poll(PollType::BordaSplit, &["a", "b"]);
        let voters = members(2);
        let responses = vec![
            response(&poll, 0, &voters[0], Some(2)),
            response(&poll, 0, &voters[1], None),
            response(&poll, 1, &voters[1], Some(2)),
            response(&poll, 1, &voters[0], Some(1)),
        ];

        let scores = ResultAggregator::scores(&responses);
        assert_eq!(scores.get(&poll.choices[0].id), Some(2));
        assert_eq!(scores.get(&poll.choices[1].id), Some(3));

        let mut exported = scores.to_vec();
        exported.sort();
        assert_eq!(exported.len(), 2);
    }

    #[test]
    fn empty_aggregator() {
        let aggregator = ResultAggregator::counts(&[]);
        assert!(aggregator.is_empty());
        assert!(aggregator.to_vec().is_empty());
    }

    #[test]
    fn report_matches_poll_type() {
        let voters = members(1);

        let poll = finished_poll(PollType::ChooseOne, &["a", "b"]);
        let responses = vec![response(&poll, 1, &voters[0], None)];
        let tally = report(&poll, &voters, &responses).unwrap();
        assert!(tally.scores.is_none());
        assert_eq!(tally.counts.unwrap()[0].choice_text, "b");

        let poll = finished_poll(PollType::BordaSingle, &["a", "b"]);
        let responses = vec![
            response(&poll, 0, &voters[0], Some(0)),
            response(&poll, 1, &voters[0], Some(1)),
        ];
        let tally = report(&poll, &voters, &responses).unwrap();
        assert!(tally.counts.is_none());
        assert_eq!(tally.scores.unwrap()[0].choice_text, "b");

        let poll = finished_poll(PollType::BordaSplit, &["a", "b"]);
        let responses = vec![
            response(&poll, 0, &voters[0], Some(2)),
            response(&poll, 1, &voters[0], None),
        ];
        let tally = report(&poll, &voters, &responses).unwrap();
        assert!(tally.scores.is_some());
        assert!(tally.counts.is_some());
        let json = serde_json::to_value(&tally).unwrap();
        assert_eq!(json["poll_type"], "borda_split");
    }

    #[test]
    fn report_requires_finished_poll() {
        let poll = open_poll(PollType::BordaSplit, &["a"]);
        assert!(matches!(
            report(&poll, &[], &[]),
            Err(Error::PollNotFinished(_))
        ));
    }
}
