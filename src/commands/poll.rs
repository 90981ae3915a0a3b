use log::info;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::Poll;
use crate::voting::{self, TallyReport};

/// Loads everything a finished poll's tally needs and runs it.
pub async fn load_report(database: &Database, poll: &Poll) -> Result<TallyReport> {
    let members = database.get_group_members(&poll.group_id).await?;
    let responses = database.get_poll_responses(&poll.id).await?;
    voting::report(poll, &members, &responses)
}

pub async fn handle_tally(database: &Database, poll_id: &str) -> Result<String> {
    let poll = database.get_poll(poll_id).await?;
    let report = load_report(database, &poll).await?;
    info!("Tallied poll {} ({})", poll.id, poll.poll_type);

    serde_json::to_string_pretty(&report)
        .map_err(|e| Error::Corrupt(format!("failed to encode report: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::VoteRecorder;
    use crate::models::{Ballot, Group, PollType};
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn tally_prints_report_once_finished() {
        let db = Arc::new(Database::connect("sqlite::memory:", 1).await.unwrap());
        let group = Group::new("club".into(), "owner@example.com".into()).unwrap();
        let owner = db.create_group(&group).await.unwrap();
        let poll = Poll::new(
            group.id.clone(),
            group.email.clone(),
            "meeting".into(),
            "which day?".into(),
            vec!["mon".into(), "tue".into()],
            Utc::now() + Duration::minutes(5),
            PollType::BordaSingle,
        )
        .unwrap();
        db.create_poll(&poll).await.unwrap();

        let ballot = Ballot::BordaSingle {
            ranking: vec![poll.choices[1].id.clone(), poll.choices[0].id.clone()],
        };
        VoteRecorder::new(db.clone()).submit(&poll, &owner, &ballot).await.unwrap();

        assert!(matches!(
            handle_tally(&db, &poll.id).await,
            Err(Error::PollNotFinished(_))
        ));

        sqlx::query("UPDATE polls SET expiration = '2000-01-01T00:00:00.000000000Z' WHERE id = ?")
            .bind(&poll.id)
            .execute(db.pool())
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&handle_tally(&db, &poll.id).await.unwrap()).unwrap();
        assert_eq!(json["scores"][0]["choice_text"], "tue");
        assert_eq!(json["scores"][0]["score"], 1);
        assert!(json.get("counts").is_none());
    }
}
