use crate::error::Result;
use crate::models::{Poll, PollType, Response};
use crate::voting::{
    assert_finished, poll_responses, result_lines, unsupported, ChoiceResult, ResultAggregator,
};
use log::debug;

/// Borda ranking: highest score sum first, ties broken by how many voters
/// named the choice.
///
/// Unscored (bottom) responses count as 0 towards the sum, so a choice only
/// ever placed in the bottom group still shows up, behind every scored one
/// with the same total. Choices nobody responded to are left out.
pub fn calculate(poll: &Poll, responses: &[Response]) -> Result<Vec<ChoiceResult>> {
    assert_finished(poll)?;
    match poll.poll_type {
        PollType::BordaSingle | PollType::BordaSplit => {}
        PollType::ChooseOne => return Err(unsupported(poll, "scores")),
    }

    let responses = poll_responses(poll, responses);
    let score_sums = ResultAggregator::scores(&responses);
    let vote_counts = ResultAggregator::counts(&responses);

    let mut results = result_lines(poll, &score_sums, &vote_counts);
    // Stable: remaining ties keep the poll's choice order.
    results.sort_by(|a, b| b.score.cmp(&a.score).then(b.votes.cmp(&a.votes)));

    debug!(
        "Scored {} choice(s) from {} response(s) for poll {}",
        results.len(),
        responses.len(),
        poll.id
    );
    Ok(results)
}
