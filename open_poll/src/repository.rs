//! Storage contract consumed by the lifecycle, and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::debug;

use crate::config::*;

/// The persisted poll and response records.
///
/// Each method is a single read or a single write. `update_poll` replaces the whole
/// record, which is what makes the close transition one atomic write. Serialising
/// concurrent transitions on the same poll is done by the caller.
pub trait PollRepository: Send + Sync {
    fn find_poll_by_code(&self, code: &str) -> PollResult<Option<Poll>>;

    fn find_poll_by_id(&self, id: PollId) -> PollResult<Option<Poll>>;

    fn insert_poll(&self, poll: Poll) -> PollResult<Poll>;

    /// Replaces the stored record with the same id. Fails with `NotFound` if there is none.
    fn update_poll(&self, poll: &Poll) -> PollResult<()>;

    /// Removes the poll and all of its responses.
    fn delete_poll(&self, id: PollId) -> PollResult<()>;

    fn insert_response(&self, response: Response) -> PollResult<Response>;

    /// All the responses of a poll, in insertion order.
    fn list_responses(&self, poll_id: PollId) -> PollResult<Vec<Response>>;

    fn count_responses(&self, poll_id: PollId) -> PollResult<u64>;

    /// All the polls, in no particular order.
    fn list_polls(&self) -> PollResult<Vec<Poll>>;
}

/// The records held by a repository, indexed for the lookups of the contract.
#[derive(Debug, Clone, Default)]
pub struct PollTables {
    pub polls: HashMap<PollId, Poll>,
    pub codes: HashMap<String, PollId>,
    pub responses: HashMap<PollId, Vec<Response>>,
}

impl PollTables {
    pub fn from_records(polls: Vec<Poll>, responses: Vec<Response>) -> PollResult<PollTables> {
        let mut tables = PollTables::default();
        for p in polls {
            tables.insert_poll(p)?;
        }
        for r in responses {
            tables.insert_response(r)?;
        }
        Ok(tables)
    }

    pub fn find_poll_by_code(&self, code: &str) -> Option<Poll> {
        self.codes
            .get(code)
            .and_then(|id| self.polls.get(id))
            .cloned()
    }

    pub fn insert_poll(&mut self, poll: Poll) -> PollResult<Poll> {
        if self.polls.contains_key(&poll.id) {
            return StorageSnafu {
                message: format!("duplicate poll id {}", poll.id),
            }
            .fail();
        }
        if self.codes.contains_key(&poll.code) {
            return StorageSnafu {
                message: format!("duplicate poll code {}", poll.code),
            }
            .fail();
        }
        self.codes.insert(poll.code.clone(), poll.id);
        self.polls.insert(poll.id, poll.clone());
        Ok(poll)
    }

    pub fn update_poll(&mut self, poll: &Poll) -> PollResult<()> {
        match self.polls.get_mut(&poll.id) {
            Some(stored) if stored.code == poll.code => {
                *stored = poll.clone();
                Ok(())
            }
            Some(stored) => StorageSnafu {
                message: format!(
                    "poll {} cannot change its code from {} to {}",
                    poll.id, stored.code, poll.code
                ),
            }
            .fail(),
            None => NotFoundSnafu {
                key: poll.id.to_string(),
            }
            .fail(),
        }
    }

    pub fn delete_poll(&mut self, id: PollId) -> PollResult<()> {
        let poll = match self.polls.remove(&id) {
            Some(p) => p,
            None => {
                return NotFoundSnafu {
                    key: id.to_string(),
                }
                .fail()
            }
        };
        self.codes.remove(&poll.code);
        let removed = self.responses.remove(&id).map(|v| v.len()).unwrap_or(0);
        debug!("delete_poll: {}: removed {} responses", id, removed);
        Ok(())
    }

    pub fn insert_response(&mut self, response: Response) -> PollResult<Response> {
        if !self.polls.contains_key(&response.poll_id) {
            return NotFoundSnafu {
                key: response.poll_id.to_string(),
            }
            .fail();
        }
        self.responses
            .entry(response.poll_id)
            .or_default()
            .push(response.clone());
        Ok(response)
    }

    pub fn list_responses(&self, poll_id: PollId) -> Vec<Response> {
        self.responses.get(&poll_id).cloned().unwrap_or_default()
    }

    pub fn count_responses(&self, poll_id: PollId) -> u64 {
        self.responses
            .get(&poll_id)
            .map(|v| v.len() as u64)
            .unwrap_or(0)
    }
}

/// A repository that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<PollTables>,
}

impl MemoryRepository {
    pub fn new() -> MemoryRepository {
        MemoryRepository::default()
    }

    fn read(&self) -> PollResult<RwLockReadGuard<'_, PollTables>> {
        self.tables.read().map_err(|_| PollError::Storage {
            message: "memory repository lock poisoned".to_string(),
        })
    }

    fn write(&self) -> PollResult<RwLockWriteGuard<'_, PollTables>> {
        self.tables.write().map_err(|_| PollError::Storage {
            message: "memory repository lock poisoned".to_string(),
        })
    }
}

impl PollRepository for MemoryRepository {
    fn find_poll_by_code(&self, code: &str) -> PollResult<Option<Poll>> {
        Ok(self.read()?.find_poll_by_code(code))
    }

    fn find_poll_by_id(&self, id: PollId) -> PollResult<Option<Poll>> {
        Ok(self.read()?.polls.get(&id).cloned())
    }

    fn insert_poll(&self, poll: Poll) -> PollResult<Poll> {
        self.write()?.insert_poll(poll)
    }

    fn update_poll(&self, poll: &Poll) -> PollResult<()> {
        self.write()?.update_poll(poll)
    }

    fn delete_poll(&self, id: PollId) -> PollResult<()> {
        self.write()?.delete_poll(id)
    }

    fn insert_response(&self, response: Response) -> PollResult<Response> {
        self.write()?.insert_response(response)
    }

    fn list_responses(&self, poll_id: PollId) -> PollResult<Vec<Response>> {
        Ok(self.read()?.list_responses(poll_id))
    }

    fn count_responses(&self, poll_id: PollId) -> PollResult<u64> {
        Ok(self.read()?.count_responses(poll_id))
    }

    fn list_polls(&self) -> PollResult<Vec<Poll>> {
        Ok(self.read()?.polls.values().cloned().collect())
    }
}
