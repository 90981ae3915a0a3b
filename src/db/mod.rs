mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Choice, Group, Member, Poll, PollType, Response};

/// Storage seam used by [`crate::handlers::vote::VoteRecorder`].
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Writes every response of one ballot or none of them.
    ///
    /// Must fail with `PollFinished` if the poll has expired at `now`, and with
    /// `DuplicateVote` on any (member, choice) pair that already exists.
    async fn commit_ballot(&self, poll: &Poll, responses: &[Response], now: DateTime<Utc>) -> Result<()>;

    async fn poll_responses(&self, poll: &Poll) -> Result<Vec<Response>>;
}

pub struct Database {
    pool: SqlitePool,
}

// How long a writer waits on another connection's lock before giving up.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

// Fixed width so that lexical order matches chronological order in queries.
fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt(format!("failed to parse {}: {}", column, e)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

fn member_from_row(row: &SqliteRow) -> Member {
    Member {
        id: row.get("id"),
        email: row.get("email"),
        group_id: row.get("group_id"),
    }
}

fn response_from_row(row: &SqliteRow) -> Response {
    Response {
        id: row.get("id"),
        choice_id: row.get("choice_id"),
        member_id: row.get("member_id"),
        score: row.get("score"),
    }
}

impl Database {
    pub async fn new(config: &Config) -> Result<Self> {
        Self::connect(&config.database_url, config.max_connections).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        // In-memory databases live and die with their connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::init_schema(&pool).await?;
        info!("Connected to {}", database_url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tells a missing poll apart from an expired one after a guarded insert wrote nothing.
    async fn closed_poll_error(tx: &mut Transaction<'_, Sqlite>, poll_id: &str) -> Result<Error> {
        let exists = sqlx::query("SELECT 1 FROM polls WHERE id = ?")
            .bind(poll_id)
            .fetch_optional(&mut **tx)
            .await?
            .is_some();
        Ok(if exists {
            Error::PollFinished(poll_id.to_string())
        } else {
            Error::NotFound(format!("poll {}", poll_id))
        })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL CHECK (length(name) >= 1),
                email TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                group_id TEXT NOT NULL,
                UNIQUE (email, group_id),
                FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                email TEXT NOT NULL,
                title TEXT NOT NULL CHECK (length(title) >= 1),
                question TEXT NOT NULL CHECK (length(question) >= 1),
                expiration TEXT NOT NULL,
                poll_type TEXT NOT NULL
                    CHECK (poll_type IN ('choose_one', 'borda_single', 'borda_split')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (group_id) REFERENCES groups(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS choices (
                id TEXT PRIMARY KEY,
                poll_id TEXT NOT NULL,
                text TEXT NOT NULL CHECK (length(text) >= 1),
                position INTEGER NOT NULL,
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                id TEXT PRIMARY KEY,
                choice_id TEXT NOT NULL,
                member_id TEXT NOT NULL,
                score INTEGER,
                UNIQUE (member_id, choice_id),
                FOREIGN KEY (choice_id) REFERENCES choices(id) ON DELETE CASCADE,
                FOREIGN KEY (member_id) REFERENCES members(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // Create a group together with its creator's membership
    pub async fn create_group(&self, group: &Group) -> Result<Member> {
        let creator = Member::new(group.id.clone(), group.email.clone())?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO groups (id, name, email) VALUES (?, ?, ?)")
            .bind(&group.id)
            .bind(&group.name)
            .bind(&group.email)
            .execute(&mut *tx)
            .await?;
        Self::insert_member(&mut tx, &creator).await?;

        tx.commit().await?;
        info!("Created group {} for {}", group.id, group.email);
        Ok(creator)
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Group> {
        let row = sqlx::query("SELECT id, name, email FROM groups WHERE id = ?")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("group {}", group_id)))?;

        Ok(Group {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
        })
    }

    async fn insert_member(tx: &mut Transaction<'_, Sqlite>, member: &Member) -> Result<()> {
        sqlx::query("INSERT INTO members (id, email, group_id) VALUES (?, ?, ?)")
            .bind(&member.id)
            .bind(&member.email)
            .bind(&member.group_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateMember {
                        group_id: member.group_id.clone(),
                        email: member.email.clone(),
                    }
                } else {
                    Error::Storage(e)
                }
            })?;
        Ok(())
    }

    pub async fn add_member(&self, group_id: &str, email: &str) -> Result<Member> {
        let group = self.get_group(group_id).await?;
        let member = Member::new(group.id, email.to_string())?;

        let mut tx = self.pool.begin().await?;
        Self::insert_member(&mut tx, &member).await?;
        tx.commit().await?;

        Ok(member)
    }

    pub async fn get_member(&self, member_id: &str) -> Result<Member> {
        sqlx::query("SELECT id, email, group_id FROM members WHERE id = ?")
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| member_from_row(&row))
            .ok_or_else(|| Error::NotFound(format!("member {}", member_id)))
    }

    pub async fn find_member(&self, group_id: &str, email: &str) -> Result<Option<Member>> {
        let member = sqlx::query("SELECT id, email, group_id FROM members WHERE group_id = ? AND email = ?")
            .bind(group_id)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| member_from_row(&row));
        Ok(member)
    }

    pub async fn get_group_members(&self, group_id: &str) -> Result<Vec<Member>> {
        let members = sqlx::query("SELECT id, email, group_id FROM members WHERE group_id = ? ORDER BY email")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(member_from_row)
            .collect();
        Ok(members)
    }

    /// Removes a member and, by cascade, their responses.
    ///
    /// Group creators stay, and responses on finished polls are frozen, so a
    /// member who voted on a finished poll cannot be removed either.
    pub async fn remove_member(&self, member_id: &str) -> Result<()> {
        let now = Utc::now();
        let member = self.get_member(member_id).await?;
        let group = self.get_group(&member.group_id).await?;
        if group.email == member.email {
            return Err(Error::CreatorRemoval(member.email));
        }

        let mut tx = self.pool.begin().await?;
        let finished = sqlx::query(
            r#"
            SELECT polls.id AS poll_id
            FROM responses
            JOIN choices ON choices.id = responses.choice_id
            JOIN polls ON polls.id = choices.poll_id
            WHERE responses.member_id = ? AND polls.expiration <= ?
            LIMIT 1
            "#,
        )
        .bind(member_id)
        .bind(encode_time(now))
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = finished {
            return Err(Error::PollFinished(row.get("poll_id")));
        }

        sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(member_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Removed member {} from group {}", member.email, member.group_id);
        Ok(())
    }

    // Create a new poll and its choices in one transaction
    pub async fn create_poll(&self, poll: &Poll) -> Result<()> {
        if self.find_member(&poll.group_id, &poll.email).await?.is_none() {
            return Err(Error::invalid(
                "email",
                format!("creator {} is not a member of group {}", poll.email, poll.group_id),
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO polls (id, group_id, email, title, question, expiration, poll_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.group_id)
        .bind(&poll.email)
        .bind(&poll.title)
        .bind(&poll.question)
        .bind(encode_time(poll.expiration))
        .bind(poll.poll_type.as_str())
        .bind(encode_time(poll.created_at))
        .bind(encode_time(poll.updated_at))
        .execute(&mut *tx)
        .await?;

        for (i, choice) in poll.choices.iter().enumerate() {
            sqlx::query("INSERT INTO choices (id, poll_id, text, position) VALUES (?, ?, ?, ?)")
                .bind(&choice.id)
                .bind(&poll.id)
                .bind(&choice.text)
                .bind(i as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Created {} poll {} in group {}", poll.poll_type, poll.id, poll.group_id);
        Ok(())
    }

    async fn poll_from_row(&self, row: &SqliteRow) -> Result<Poll> {
        let id: String = row.get("id");
        let poll_type: String = row.get("poll_type");

        let choices = sqlx::query("SELECT id, poll_id, text FROM choices WHERE poll_id = ? ORDER BY position")
            .bind(&id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| Choice {
                id: row.get("id"),
                poll_id: row.get("poll_id"),
                text: row.get("text"),
            })
            .collect();

        Ok(Poll {
            id,
            group_id: row.get("group_id"),
            email: row.get("email"),
            title: row.get("title"),
            question: row.get("question"),
            choices,
            expiration: decode_time(&row.get::<String, _>("expiration"), "expiration")?,
            poll_type: PollType::from_str(&poll_type)
                .map_err(|_| Error::Corrupt(format!("unknown poll type: {}", poll_type)))?,
            created_at: decode_time(&row.get::<String, _>("created_at"), "created_at")?,
            updated_at: decode_time(&row.get::<String, _>("updated_at"), "updated_at")?,
        })
    }

    pub async fn get_poll(&self, poll_id: &str) -> Result<Poll> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, email, title, question, expiration, poll_type, created_at, updated_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("poll {}", poll_id)))?;

        self.poll_from_row(&row).await
    }

    /// Polls of a group, optionally limited to an expiration range (inclusive).
    pub async fn get_group_polls(
        &self,
        group_id: &str,
        start_expiration: Option<DateTime<Utc>>,
        end_expiration: Option<DateTime<Utc>>,
    ) -> Result<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, email, title, question, expiration, poll_type, created_at, updated_at
            FROM polls
            WHERE group_id = ?
              AND (? IS NULL OR expiration >= ?)
              AND (? IS NULL OR expiration <= ?)
            ORDER BY expiration
            "#,
        )
        .bind(group_id)
        .bind(start_expiration.map(encode_time))
        .bind(start_expiration.map(encode_time))
        .bind(end_expiration.map(encode_time))
        .bind(end_expiration.map(encode_time))
        .fetch_all(&self.pool)
        .await?;

        let mut polls = Vec::with_capacity(rows.len());
        for row in &rows {
            polls.push(self.poll_from_row(row).await?);
        }
        Ok(polls)
    }

    // Polls whose expiration fell in (from, to]
    pub async fn get_polls_finished_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, email, title, question, expiration, poll_type, created_at, updated_at
            FROM polls
            WHERE expiration > ? AND expiration <= ?
            ORDER BY expiration
            "#,
        )
        .bind(encode_time(from))
        .bind(encode_time(to))
        .fetch_all(&self.pool)
        .await?;

        let mut polls = Vec::with_capacity(rows.len());
        for row in &rows {
            polls.push(self.poll_from_row(row).await?);
        }
        Ok(polls)
    }

    pub async fn get_poll_responses(&self, poll_id: &str) -> Result<Vec<Response>> {
        let responses = sqlx::query(
            r#"
            SELECT responses.id, responses.choice_id, responses.member_id, responses.score
            FROM responses
            JOIN choices ON choices.id = responses.choice_id
            WHERE choices.poll_id = ?
            ORDER BY choices.position, responses.member_id
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(response_from_row)
        .collect();
        Ok(responses)
    }
}

#[async_trait]
impl VoteStore for Database {
    async fn commit_ballot(&self, poll: &Poll, responses: &[Response], now: DateTime<Utc>) -> Result<()> {
        // Dropping `tx` on any early return rolls back what was written so far.
        let mut tx = self.pool.begin().await?;
        let open_until = encode_time(now);

        // Every statement is a write, so the transaction takes the write lock on
        // its first statement instead of upgrading from a read lock later.
        for response in responses {
            let inserted = sqlx::query(
                r#"
                INSERT INTO responses (id, choice_id, member_id, score)
                SELECT ?, ?, ?, ? FROM polls WHERE id = ? AND expiration > ?
                "#,
            )
            .bind(&response.id)
            .bind(&response.choice_id)
            .bind(&response.member_id)
            .bind(response.score)
            .bind(&poll.id)
            .bind(&open_until)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateVote {
                        member_id: response.member_id.clone(),
                        choice_id: response.choice_id.clone(),
                    }
                } else {
                    Error::Storage(e)
                }
            })?;

            if inserted.rows_affected() == 0 {
                return Err(Self::closed_poll_error(&mut tx, &poll.id).await?);
            }
        }

        tx.commit().await?;
        debug!("Committed {} response(s) on poll {}", responses.len(), poll.id);
        Ok(())
    }

    async fn poll_responses(&self, poll: &Poll) -> Result<Vec<Response>> {
        self.get_poll_responses(&poll.id).await
    }
}
