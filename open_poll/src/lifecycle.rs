use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info};
use rand::RngCore;
use snafu::{ensure, OptionExt};

use crate::access::{AccessCheck, RequestContext};
use crate::aggregate::aggregate_responses;
use crate::code::generate_unique_code;
use crate::config::*;
use crate::repository::PollRepository;
use crate::summary::{resolve_summary, SummaryProvider};

/// One mutex per poll id.
///
/// Every transition and every submission holds the lock of its poll for the whole
/// read-check-write sequence. In particular, a submission either lands before a
/// close reads the responses, or observes the poll closed.
#[derive(Debug, Default)]
pub(crate) struct PollLocks {
    table: Mutex<HashMap<PollId, Arc<Mutex<()>>>>,
}

impl PollLocks {
    pub(crate) fn slot(&self, id: PollId) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(table.entry(id).or_default())
    }

    pub(crate) fn forget(&self, id: PollId) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// The mutex guards no data, so a poisoned lock is still usable.
pub(crate) fn hold(slot: &Mutex<()>) -> MutexGuard<'_, ()> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The poll lifecycle: creation, closing with aggregation, reopening, editing and
/// deletion, plus the response intake (see `intake.rs`).
///
/// Build one with [`crate::builder::PollServiceBuilder`]. The service is `Send + Sync`
/// and meant to be shared behind an `Arc`.
pub struct PollService {
    pub(crate) repo: Arc<dyn PollRepository>,
    pub(crate) summaries: Arc<dyn SummaryProvider>,
    pub(crate) access: Arc<dyn AccessCheck>,
    pub(crate) rng: Mutex<Box<dyn RngCore + Send>>,
    pub(crate) config: ServiceConfig,
    pub(crate) locks: PollLocks,
}

/// Trims a question or a response text, rejecting blank ones.
pub(crate) fn non_blank(text: &str, what: &str) -> PollResult<String> {
    let trimmed = text.trim();
    ensure!(
        !trimmed.is_empty(),
        ValidationSnafu {
            reason: format!("{} is required", what),
        }
    );
    Ok(trimmed.to_string())
}

impl PollService {
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn PollRepository> {
        &self.repo
    }

    fn require_admin(&self, ctx: &RequestContext, action: &'static str) -> PollResult<()> {
        ensure!(self.access.is_admin(ctx), UnauthorizedSnafu { action });
        Ok(())
    }

    pub(crate) fn load(&self, id: PollId) -> PollResult<Poll> {
        self.repo.find_poll_by_id(id)?.context(NotFoundSnafu {
            key: id.to_string(),
        })
    }

    /// Like `load`, for a caller holding the poll lock. The lock slot of an unknown id
    /// is dropped so the lock table only tracks existing polls.
    pub(crate) fn load_locked(&self, id: PollId) -> PollResult<Poll> {
        let res = self.load(id);
        if let Err(PollError::NotFound { .. }) = &res {
            self.locks.forget(id);
        }
        res
    }

    /// Publishes a new question. The poll starts active, with a fresh code.
    pub fn create_poll(&self, ctx: &RequestContext, question: &str) -> PollResult<Poll> {
        self.require_admin(ctx, "create a poll")?;
        let question = non_blank(question, "Question")?;

        // Allocating the code and inserting the poll happen under the same lock, so two
        // concurrent creations cannot both pick a code that was free.
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let code = generate_unique_code(&mut **rng, &self.config.codes, self.repo.as_ref())?;
        let poll = self
            .repo
            .insert_poll(Poll::new(&question, &code, Utc::now()))?;
        drop(rng);

        info!("Poll {} created with code {}", poll.id, poll.code);
        Ok(poll)
    }

    /// Closes an active poll and stores its aggregate.
    ///
    /// The responses are read, ranked and summarized while the poll lock is held,
    /// then the status, closing date and aggregate are written in one update. A
    /// failing summary provider does not prevent the close.
    pub fn close_poll(&self, ctx: &RequestContext, id: PollId) -> PollResult<Poll> {
        self.require_admin(ctx, "close a poll")?;
        let slot = self.locks.slot(id);
        let _guard = hold(&slot);

        let mut poll = self.load_locked(id)?;
        ensure!(
            !poll.is_closed(),
            InvalidStateSnafu {
                id,
                status: poll.status(),
                action: "close",
            }
        );

        let texts: Vec<String> = self
            .repo
            .list_responses(id)?
            .into_iter()
            .map(|r| r.text)
            .collect();
        debug!("close_poll: {}: aggregating {} responses", id, texts.len());
        let frequencies = aggregate_responses(&texts, &self.config.aggregation);
        let summary = resolve_summary(
            &self.summaries,
            &poll.question,
            &texts,
            self.config.summary_timeout,
        );

        poll.word_frequencies = Some(frequencies);
        poll.summary_text = Some(summary);
        poll.state = PollState::Closed {
            closed_at: Utc::now(),
        };
        self.repo.update_poll(&poll)?;

        info!(
            "Poll {} closed with {} responses, {} ranked terms",
            id,
            texts.len(),
            poll.word_frequencies.as_ref().map(|v| v.len()).unwrap_or(0)
        );
        Ok(poll)
    }

    /// Makes a closed poll accept responses again.
    ///
    /// The aggregate of the last close is kept as it is. It gets replaced by the next
    /// close.
    pub fn reopen_poll(&self, ctx: &RequestContext, id: PollId) -> PollResult<Poll> {
        self.require_admin(ctx, "reopen a poll")?;
        let slot = self.locks.slot(id);
        let _guard = hold(&slot);

        let mut poll = self.load_locked(id)?;
        ensure!(
            poll.is_closed(),
            InvalidStateSnafu {
                id,
                status: poll.status(),
                action: "reopen",
            }
        );
        poll.state = PollState::Active;
        self.repo.update_poll(&poll)?;

        info!("Poll {} reopened", id);
        Ok(poll)
    }

    /// Changes the question of an active poll.
    ///
    /// Closed polls cannot be edited: their aggregate was computed for the question as
    /// it was worded.
    pub fn edit_poll(&self, ctx: &RequestContext, id: PollId, question: &str) -> PollResult<Poll> {
        self.require_admin(ctx, "edit a poll")?;
        let question = non_blank(question, "Question")?;
        let slot = self.locks.slot(id);
        let _guard = hold(&slot);

        let mut poll = self.load_locked(id)?;
        ensure!(
            !poll.is_closed(),
            InvalidStateSnafu {
                id,
                status: poll.status(),
                action: "edit",
            }
        );
        poll.question = question;
        self.repo.update_poll(&poll)?;

        info!("Poll {} edited", id);
        Ok(poll)
    }

    /// Deletes a poll and all its responses.
    pub fn delete_poll(&self, ctx: &RequestContext, id: PollId) -> PollResult<()> {
        self.require_admin(ctx, "delete a poll")?;
        {
            let slot = self.locks.slot(id);
            let _guard = hold(&slot);
            self.load_locked(id)?;
            self.repo.delete_poll(id)?;
        }
        self.locks.forget(id);

        info!("Poll {} deleted", id);
        Ok(())
    }

    /// A poll with all its responses, newest first.
    pub fn poll_detail(&self, ctx: &RequestContext, id: PollId) -> PollResult<PollDetail> {
        self.require_admin(ctx, "view poll responses")?;
        let poll = self.load(id)?;
        let mut responses = self.repo.list_responses(id)?;
        // Reversing first keeps the latest insertion first among equal timestamps.
        responses.reverse();
        responses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(PollDetail { poll, responses })
    }

    /// All the polls with their response counts, newest first.
    pub fn list_polls(&self, ctx: &RequestContext) -> PollResult<Vec<PollSummary>> {
        self.require_admin(ctx, "list polls")?;
        let mut polls = self.repo.list_polls()?;
        polls.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        let mut res: Vec<PollSummary> = Vec::with_capacity(polls.len());
        for poll in polls {
            let response_count = self.repo.count_responses(poll.id)?;
            res.push(PollSummary {
                poll,
                response_count,
            });
        }
        Ok(res)
    }
}
