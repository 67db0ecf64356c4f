/*!
Lifecycle and response-aggregation engine for open-ended text polls.

An administrator publishes a question. Respondents find it through a short code
and answer in free text. Closing the poll ranks the terms used across all the
answers and stores a narrative summary next to the ranking.

The entry point is [`PollService`], assembled with [`builder::PollServiceBuilder`].
Storage, summaries and the admin check are collaborators behind the
[`PollRepository`], [`SummaryProvider`] and [`AccessCheck`] traits.

See the [`manual`] for the command line interface.
*/

mod access;
mod aggregate;
pub mod builder;
mod code;
mod config;
mod intake;
mod lifecycle;
pub mod manual;
mod repository;
mod summary;

pub use crate::access::*;
pub use crate::aggregate::*;
pub use crate::code::*;
pub use crate::config::*;
pub use crate::intake::normalize_code;
pub use crate::lifecycle::PollService;
pub use crate::repository::*;
pub use crate::summary::*;
