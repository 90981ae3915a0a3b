use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    )
    .unwrap();
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn validate_email(email: &str, what: &str) -> Result<()> {
    if email.is_empty() {
        return Err(Error::invalid("email", format!("{} created with empty email", what)));
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err(Error::invalid(
            "email",
            format!("{} created with invalid email: '{}'", what, email),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Email of the member who created the group. Never removable.
    pub email: String,
}

impl Group {
    pub fn new(name: String, creator_email: String) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::invalid("name", "group name cannot be empty"));
        }
        validate_email(&creator_email, "Group")?;
        Ok(Self {
            id: new_id(),
            name,
            email: creator_email,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub email: String,
    pub group_id: String,
}

impl Member {
    pub fn new(group_id: String, email: String) -> Result<Self> {
        validate_email(&email, "Member")?;
        Ok(Self {
            id: new_id(),
            email,
            group_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollType {
    ChooseOne,
    BordaSingle,
    BordaSplit,
}

impl PollType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollType::ChooseOne => "choose_one",
            PollType::BordaSingle => "borda_single",
            PollType::BordaSplit => "borda_split",
        }
    }
}

impl fmt::Display for PollType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "choose_one" => Ok(PollType::ChooseOne),
            "borda_single" => Ok(PollType::BordaSingle),
            "borda_split" => Ok(PollType::BordaSplit),
            other => Err(Error::invalid("type", format!("unknown poll type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub poll_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub group_id: String,
    /// Email of the creating member.
    pub email: String,
    pub title: String,
    pub question: String,
    pub choices: Vec<Choice>,
    pub expiration: DateTime<Utc>,
    pub poll_type: PollType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Poll {
    pub fn new(
        group_id: String,
        creator_email: String,
        title: String,
        question: String,
        choices: Vec<String>,
        expiration: DateTime<Utc>,
        poll_type: PollType,
    ) -> Result<Self> {
        let now = Utc::now();

        if title.trim().is_empty() {
            return Err(Error::invalid("title", "poll title cannot be empty"));
        }
        if question.trim().is_empty() {
            return Err(Error::invalid("question", "poll question cannot be empty"));
        }
        validate_email(&creator_email, "Poll")?;
        if expiration <= now {
            return Err(Error::invalid("expiration", "poll is created expired"));
        }
        if choices.is_empty() {
            return Err(Error::invalid("choices", "poll needs at least one choice"));
        }
        if choices.iter().any(|text| text.trim().is_empty()) {
            return Err(Error::invalid("choices", "choice text cannot be empty"));
        }

        let id = new_id();
        let choices = choices
            .into_iter()
            .map(|text| Choice {
                id: new_id(),
                poll_id: id.clone(),
                text,
            })
            .collect();

        Ok(Self {
            id,
            group_id,
            email: creator_email,
            title,
            question,
            choices,
            expiration,
            poll_type,
            created_at: now,
            updated_at: now,
        })
    }

    /// Derived state: a poll closes once its expiration has passed.
    pub fn is_finished(&self) -> bool {
        self.is_finished_at(Utc::now())
    }

    pub fn is_finished_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration
    }

    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id == choice_id)
    }

    pub fn choice_by_text(&self, text: &str) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.text == text)
    }

    pub fn has_choice(&self, choice_id: &str) -> bool {
        self.choice(choice_id).is_some()
    }
}

/// One member's vote on one choice. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub choice_id: String,
    pub member_id: String,
    pub score: Option<i32>,
}

impl Response {
    pub fn new(choice_id: String, member_id: String, score: Option<i32>) -> Self {
        Self {
            id: new_id(),
            choice_id,
            member_id,
            score,
        }
    }
}

/// A member's full submission for a poll, already decoded by the web layer.
///
/// Ranked sequences are most preferred first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ballot {
    ChooseOne { choice: String },
    BordaSingle { ranking: Vec<String> },
    BordaSplit { ranked: Vec<String>, bottom: Vec<String> },
}

impl Ballot {
    pub fn choice_ids(&self) -> impl Iterator<Item = &String> {
        let none: &[String] = &[];
        let (first, second) = match self {
            Ballot::ChooseOne { choice } => (std::slice::from_ref(choice), none),
            Ballot::BordaSingle { ranking } => (ranking.as_slice(), none),
            Ballot::BordaSplit { ranked, bottom } => (ranked.as_slice(), bottom.as_slice()),
        };
        first.iter().chain(second.iter())
    }

    pub fn len(&self) -> usize {
        self.choice_ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
