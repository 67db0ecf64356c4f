use chrono::Utc;
use log::{debug, info};
use snafu::{ensure, OptionExt};

use crate::config::*;
use crate::lifecycle::{hold, non_blank, PollService};

/// Codes are shown in uppercase. What respondents type is matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl PollService {
    fn find_by_code_raw(&self, code: &str) -> PollResult<Poll> {
        self.repo
            .find_poll_by_code(&normalize_code(code))?
            .context(NotFoundSnafu {
                key: format!("code {}", code.trim()),
            })
    }

    /// Resolves a public code. Open to anonymous callers.
    pub fn find_by_code(&self, code: &str) -> PollResult<PollSummary> {
        let poll = self.find_by_code_raw(code)?;
        let response_count = self.repo.count_responses(poll.id)?;
        Ok(PollSummary {
            poll,
            response_count,
        })
    }

    /// Records one response to the poll behind `code`.
    ///
    /// The poll state is checked again once the poll lock is held, so a response is
    /// never accepted after a concurrent close started aggregating.
    pub fn submit_response(&self, code: &str, text: &str) -> PollResult<Response> {
        let found = self.find_by_code_raw(code)?;
        let slot = self.locks.slot(found.id);
        let _guard = hold(&slot);

        // The poll may have been closed or deleted since the lookup.
        let poll = self.load_locked(found.id)?;
        ensure!(
            !poll.is_closed(),
            ClosedPollSnafu {
                code: poll.code.clone(),
            }
        );
        let text = non_blank(text, "Response text")?;

        let response = self
            .repo
            .insert_response(Response::new(poll.id, &text, Utc::now()))?;
        debug!(
            "submit_response: poll {}: {} characters",
            poll.id,
            text.chars().count()
        );
        info!("Response {} recorded for poll {}", response.id, poll.code);
        Ok(response)
    }
}
