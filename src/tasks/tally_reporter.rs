use chrono::{DateTime, Utc};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::interval;

use crate::commands::poll::load_report;
use crate::db::Database;
use crate::error::Result;
use crate::voting::TallyReport;

pub async fn check_finished_polls_task(database: Arc<Database>, every: StdDuration) {
    info!("Starting background task to report finished polls...");
    let mut interval = interval(every);
    let mut last_check = Utc::now();

    loop {
        interval.tick().await;
        let now = Utc::now();

        match report_finished(&database, last_check, now).await {
            Ok(reports) => {
                if !reports.is_empty() {
                    info!("Reported {} finished poll(s).", reports.len());
                }
            }
            Err(e) => {
                error!("Failed to query for finished polls: {}", e);
                // Retry the same window on the next tick.
                continue;
            }
        }
        last_check = now;
    }
}

/// Tallies every poll whose expiration fell in `(from, to]` and logs the report.
pub async fn report_finished(
    database: &Database,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TallyReport>> {
    let polls = database.get_polls_finished_between(from, to).await?;
    let mut reports = Vec::with_capacity(polls.len());

    for poll in polls {
        match load_report(database, &poll).await {
            Ok(report) => {
                match serde_json::to_string(&report) {
                    Ok(json) => info!("Poll {} finished: {}", poll.id, json),
                    Err(e) => error!("Failed to encode report for poll {}: {}", poll.id, e),
                }
                reports.push(report);
            }
            Err(e) => error!("Error tallying finished poll {}: {}", poll.id, e),
        }
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Group, Poll, PollType};
    use chrono::Duration;

    #[tokio::test]
    async fn reports_only_polls_in_window() {
        let db = Database::connect("sqlite::memory:", 1).await.unwrap();
        let group = Group::new("club".into(), "owner@example.com".into()).unwrap();
        db.create_group(&group).await.unwrap();

        let mut ids = Vec::new();
        for title in ["first", "second"] {
            let poll = Poll::new(
                group.id.clone(),
                group.email.clone(),
                title.into(),
                "question".into(),
                vec!["a".into()],
                Utc::now() + Duration::minutes(5),
                PollType::ChooseOne,
            )
            .unwrap();
            db.create_poll(&poll).await.unwrap();
            ids.push(poll.id);
        }

        sqlx::query("UPDATE polls SET expiration = ? WHERE id = ?")
            .bind((Utc::now() - Duration::seconds(5)).to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            .bind(&ids[0])
            .execute(db.pool())
            .await
            .unwrap();

        let reports = report_finished(&db, Utc::now() - Duration::minutes(1), Utc::now())
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].poll_id, ids[0]);
        assert_eq!(reports[0].breakdown.unresponded.len(), 1);

        let later = report_finished(&db, Utc::now(), Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert!(later.is_empty());
    }
}
