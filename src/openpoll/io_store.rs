// A poll repository persisted in a single JSON file.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use fs2::FileExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::openpoll::*;

/// Exclusive hold on `<store>.lock`. Released when dropped.
#[derive(Debug)]
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".lock");
    PathBuf::from(p)
}

// Blocks until no other store (in this process or another one) holds the lock.
fn acquire_store_lock(path: &Path) -> CliResult<StoreLock> {
    let lock_path = lock_path_for(path);
    let lock_str = lock_path.display().to_string();
    if let Some(dir) = lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).context(LockingStoreSnafu { path: &lock_str })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .context(LockingStoreSnafu { path: &lock_str })?;
    file.lock_exclusive()
        .context(LockingStoreSnafu { path: &lock_str })?;
    debug!("acquire_store_lock: {}", lock_str);
    Ok(StoreLock { file })
}

/// Layout of the store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    polls: Vec<Poll>,
    responses: Vec<Response>,
}

impl StoreFile {
    // Oldest poll first, each poll followed by its responses in the order received.
    fn from_tables(tables: &PollTables) -> StoreFile {
        let mut polls: Vec<Poll> = tables.polls.values().cloned().collect();
        polls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.code.cmp(&b.code)));
        let responses = polls
            .iter()
            .flat_map(|p| tables.list_responses(p.id))
            .collect();
        StoreFile { polls, responses }
    }
}

/// Every write rewrites the whole file, through a temporary file and a rename, so a
/// crash leaves either the old or the new content. The in-memory tables only change
/// once the file is written.
///
/// An open store holds an exclusive lock on `<store>.lock` until it is dropped. Two
/// commands on the same file therefore run one after the other, and the snapshot
/// loaded by `open` stays the current content of the file for the life of the store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    tables: Mutex<PollTables>,
    _lock: StoreLock,
}

impl JsonFileStore {
    /// Opens the store, waiting for any other holder of the store lock to finish.
    /// A missing file is an empty store; it is created on the first write.
    pub fn open(path: &str) -> CliResult<JsonFileStore> {
        let lock = acquire_store_lock(Path::new(path))?;
        let tables = match fs::read_to_string(path) {
            Ok(contents) => {
                let file: StoreFile =
                    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
                info!(
                    "Opened store {}: {} polls, {} responses",
                    path,
                    file.polls.len(),
                    file.responses.len()
                );
                PollTables::from_records(file.polls, file.responses).context(PollSnafu {})?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("Store {} does not exist yet, starting empty", path);
                PollTables::default()
            }
            Err(e) => return Err(e).context(OpeningJsonSnafu { path }),
        };
        Ok(JsonFileStore {
            path: PathBuf::from(path),
            tables: Mutex::new(tables),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> PollResult<MutexGuard<'_, PollTables>> {
        self.tables.lock().map_err(|_| PollError::Storage {
            message: format!("store {} lock poisoned", self.path.display()),
        })
    }

    fn persist(&self, tables: &PollTables) -> PollResult<()> {
        let storage = |what: &str, e: &dyn std::error::Error| PollError::Storage {
            message: format!("{} {}: {}", what, self.path.display(), e),
        };
        let js = serde_json::to_string_pretty(&StoreFile::from_tables(tables))
            .map_err(|e| storage("cannot serialize", &e))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| storage("cannot create the directory of", &e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, js).map_err(|e| storage("cannot write", &e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage("cannot replace", &e))?;
        debug!("persist: wrote {}", self.path.display());
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut PollTables) -> PollResult<T>) -> PollResult<T> {
        let mut current = self.lock()?;
        let mut next = current.clone();
        let res = f(&mut next)?;
        self.persist(&next)?;
        *current = next;
        Ok(res)
    }
}

impl PollRepository for JsonFileStore {
    fn find_poll_by_code(&self, code: &str) -> PollResult<Option<Poll>> {
        Ok(self.lock()?.find_poll_by_code(code))
    }

    fn find_poll_by_id(&self, id: PollId) -> PollResult<Option<Poll>> {
        Ok(self.lock()?.polls.get(&id).cloned())
    }

    fn insert_poll(&self, poll: Poll) -> PollResult<Poll> {
        self.mutate(|t| t.insert_poll(poll))
    }

    fn update_poll(&self, poll: &Poll) -> PollResult<()> {
        self.mutate(|t| t.update_poll(poll))
    }

    fn delete_poll(&self, id: PollId) -> PollResult<()> {
        self.mutate(|t| t.delete_poll(id))
    }

    fn insert_response(&self, response: Response) -> PollResult<Response> {
        self.mutate(|t| t.insert_response(response))
    }

    fn list_responses(&self, poll_id: PollId) -> PollResult<Vec<Response>> {
        Ok(self.lock()?.list_responses(poll_id))
    }

    fn count_responses(&self, poll_id: PollId) -> PollResult<u64> {
        Ok(self.lock()?.count_responses(poll_id))
    }

    fn list_polls(&self) -> PollResult<Vec<Poll>> {
        Ok(self.lock()?.polls.values().cloned().collect())
    }
}
