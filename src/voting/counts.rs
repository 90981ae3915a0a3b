use crate::error::Result;
use crate::models::{Poll, PollType, Response};
use crate::voting::{
    assert_finished, poll_responses, result_lines, unsupported, ChoiceResult, ResultAggregator,
};

/// Ranks choices by how often they were selected.
///
/// For `borda_split` the score sum breaks ties, the inverse precedence of
/// [`super::scores::calculate`].
pub fn calculate(poll: &Poll, responses: &[Response]) -> Result<Vec<ChoiceResult>> {
    assert_finished(poll)?;

    let responses = poll_responses(poll, responses);
    let vote_counts = ResultAggregator::counts(&responses);

    let results = match poll.poll_type {
        PollType::ChooseOne => {
            let mut results = result_lines(poll, &ResultAggregator::default(), &vote_counts);
            results.sort_by(|a, b| b.votes.cmp(&a.votes));
            results
        }
        PollType::BordaSplit => {
            let score_sums = ResultAggregator::scores(&responses);
            let mut results = result_lines(poll, &score_sums, &vote_counts);
            results.sort_by(|a, b| b.votes.cmp(&a.votes).then(b.score.cmp(&a.score)));
            results
        }
        PollType::BordaSingle => return Err(unsupported(poll, "counts")),
    };

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::voting::test_support::*;

    #[test]
    fn choose_one_orders_by_votes() {
        let poll = finished_poll(PollType::ChooseOne, &["a", "b", "c"]);
        let voters = members(4);
        let responses = vec![
            response(&poll, 2, &voters[0], None),
            response(&poll, 1, &voters[1], None),
            response(&poll, 2, &voters[2], None),
            response(&poll, 2, &voters[3], None),
        ];

        let results = calculate(&poll, &responses).unwrap();
        let lines: Vec<_> = results
            .iter()
            .map(|r| (r.choice_text.as_str(), r.votes, r.score))
            .collect();
        assert_eq!(lines, vec![("c", 3, 0), ("b", 1, 0)]);
    }

    #[test]
    fn borda_split_counts_then_scores() {
        let poll = finished_poll(PollType::BordaSplit, &["a", "b", "c", "d"]);
        let voters = members(1);
        let responses = vec![
            response(&poll, 0, &voters[0], Some(4)),
            response(&poll, 1, &voters[0], Some(3)),
            response(&poll, 2, &voters[0], None),
            response(&poll, 3, &voters[0], None),
        ];

        // All four tie at one vote; score sum decides, bottom choices keep poll order.
        let results = calculate(&poll, &responses).unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.choice_text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        assert!(results.iter().all(|r| r.votes == 1));
    }

    #[test]
    fn borda_split_prefers_frequency_over_score() {
        let poll = finished_poll(PollType::BordaSplit, &["a", "b"]);
        let voters = members(2);
        let responses = vec![
            response(&poll, 0, &voters[0], Some(2)),
            response(&poll, 1, &voters[1], Some(1)),
            response(&poll, 1, &voters[0], None),
        ];

        let results = calculate(&poll, &responses).unwrap();
        assert_eq!(results[0].choice_text, "b");
        assert_eq!(results[0].votes, 2);
        assert_eq!(results[1].choice_text, "a");
    }

    #[test]
    fn rejects_open_polls_and_borda_single() {
        let open = open_poll(PollType::ChooseOne, &["a"]);
        assert!(matches!(calculate(&open, &[]), Err(Error::PollNotFinished(_))));

        let borda_single = finished_poll(PollType::BordaSingle, &["a"]);
        assert!(matches!(
            calculate(&borda_single, &[]),
            Err(Error::UnsupportedPollType {
                poll_type: PollType::BordaSingle,
                ..
            })
        ));
    }
}
