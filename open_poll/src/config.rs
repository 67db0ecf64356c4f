// ********* Records ***********

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use uuid::Uuid;

/// Opaque identity of a poll. Distinct from the public [`Poll::code`].
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(pub Uuid);

impl PollId {
    pub fn new() -> PollId {
        PollId(Uuid::new_v4())
    }
}

impl Default for PollId {
    fn default() -> Self {
        PollId::new()
    }
}

impl Display for PollId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PollId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(PollId)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Uuid);

impl ResponseId {
    pub fn new() -> ResponseId {
        ResponseId(Uuid::new_v4())
    }
}

impl Default for ResponseId {
    fn default() -> Self {
        ResponseId::new()
    }
}

impl Display for ResponseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollStatus {
    Active,
    Closed,
}

impl Display for PollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollStatus::Active => write!(f, "active"),
            PollStatus::Closed => write!(f, "closed"),
        }
    }
}

/// The lifecycle state of a poll.
///
/// The closing timestamp only exists inside the `Closed` variant, so a poll can never
/// be active with a closing date, or closed without one.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PollState {
    Active,
    Closed {
        #[serde(rename = "closedAt")]
        closed_at: DateTime<Utc>,
    },
}

/// One ranked term of the word-frequency aggregate.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Serialize, Deserialize)]
pub struct TermCount {
    pub term: String,
    pub count: u64,
}

impl TermCount {
    pub fn new(term: &str, count: u64) -> TermCount {
        TermCount {
            term: term.to_string(),
            count,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub question: String,
    /// Public short code used by respondents. Never changes after creation.
    pub code: String,
    #[serde(flatten)]
    pub state: PollState,
    pub created_at: DateTime<Utc>,
    /// Set by the first successful close. Kept across reopening.
    pub word_frequencies: Option<Vec<TermCount>>,
    pub summary_text: Option<String>,
}

impl Poll {
    /// A fresh active poll, without any aggregate.
    pub fn new(question: &str, code: &str, created_at: DateTime<Utc>) -> Poll {
        Poll {
            id: PollId::new(),
            question: question.to_string(),
            code: code.to_string(),
            state: PollState::Active,
            created_at,
            word_frequencies: None,
            summary_text: None,
        }
    }

    pub fn status(&self) -> PollStatus {
        match self.state {
            PollState::Active => PollStatus::Active,
            PollState::Closed { .. } => PollStatus::Closed,
        }
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            PollState::Active => None,
            PollState::Closed { closed_at } => Some(closed_at),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status() == PollStatus::Closed
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: ResponseId,
    pub poll_id: PollId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Response {
    pub fn new(poll_id: PollId, text: &str, created_at: DateTime<Utc>) -> Response {
        Response {
            id: ResponseId::new(),
            poll_id,
            text: text.to_string(),
            created_at,
        }
    }
}

// ******** Read models *********

/// A poll together with the number of responses it collected.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    #[serde(flatten)]
    pub poll: Poll,
    pub response_count: u64,
}

/// A poll with all its responses, newest first.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollDetail {
    #[serde(flatten)]
    pub poll: Poll,
    pub responses: Vec<Response>,
}

// ******** Errors *********

/// Errors returned by the lifecycle operations and by repositories.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PollError {
    #[snafu(display("Invalid input: {reason}"))]
    Validation { reason: String },

    #[snafu(display("No poll found for {key}"))]
    NotFound { key: String },

    #[snafu(display("Poll {id} is {status}, cannot {action} it"))]
    InvalidState {
        id: PollId,
        status: PollStatus,
        action: &'static str,
    },

    #[snafu(display("Poll {code} is closed and not accepting responses"))]
    ClosedPoll { code: String },

    #[snafu(display("Failed to generate a unique poll code after {attempts} attempts"))]
    Exhausted { attempts: u32 },

    #[snafu(display("Only an administrator may {action}"))]
    Unauthorized { action: &'static str },

    #[snafu(display("Storage failure: {message}"))]
    Storage { message: String },
}

pub type PollResult<T> = Result<T, PollError>;

/// Failure of a summary provider. Absorbed by the close transition.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SummaryError {
    #[snafu(display("Summary service unavailable: {reason}"))]
    ServiceUnavailable { reason: String },
}

// ********* Configuration **********

/// How terms with the same count are ordered in the ranking.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// Equal counts are sorted by term. The output does not depend on the order
    /// of the responses.
    Alphabetical,
    /// Equal counts keep the order in which the terms first appear in the joined text.
    FirstSeen,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AggregationRules {
    /// Terms seen fewer times than this are dropped.
    pub min_count: u64,
    /// Size cap of the ranking.
    pub max_terms: usize,
    /// Tokens shorter than this (in characters) are dropped.
    pub min_token_chars: usize,
    pub tiebreak_mode: TieBreakMode,
}

impl AggregationRules {
    pub const DEFAULT_RULES: AggregationRules = AggregationRules {
        min_count: 2,
        max_terms: 50,
        min_token_chars: 3,
        tiebreak_mode: TieBreakMode::Alphabetical,
    };
}

impl Default for AggregationRules {
    fn default() -> Self {
        AggregationRules::DEFAULT_RULES
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct CodeRules {
    pub length: usize,
    pub max_attempts: u32,
}

impl CodeRules {
    pub const DEFAULT_RULES: CodeRules = CodeRules {
        length: 6,
        max_attempts: 10,
    };
}

impl Default for CodeRules {
    fn default() -> Self {
        CodeRules::DEFAULT_RULES
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ServiceConfig {
    pub aggregation: AggregationRules,
    pub codes: CodeRules,
    /// Deadline for one call to the summary provider. `None` waits indefinitely.
    pub summary_timeout: Option<Duration>,
}

impl ServiceConfig {
    pub const DEFAULT: ServiceConfig = ServiceConfig {
        aggregation: AggregationRules::DEFAULT_RULES,
        codes: CodeRules::DEFAULT_RULES,
        summary_timeout: None,
    };
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig::DEFAULT
    }
}
