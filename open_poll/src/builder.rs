use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::access::AccessCheck;
use crate::config::*;
use crate::lifecycle::{PollLocks, PollService};
use crate::repository::{MemoryRepository, PollRepository};
use crate::summary::{StatisticalSummaryProvider, SummaryProvider};

/// Assembles a [`PollService`] from its collaborators.
///
/// The access check is mandatory. The other collaborators default to an in-memory
/// repository, the statistical summary and an entropy-seeded random source.
///
/// ```
/// use std::sync::Arc;
/// use open_poll::builder::PollServiceBuilder;
/// use open_poll::{PasswordAccess, PollStatus, RequestContext, ServiceConfig};
/// # use open_poll::PollError;
///
/// let service = PollServiceBuilder::new(&ServiceConfig::DEFAULT)
///     .access(Arc::new(PasswordAccess::new("secret")))
///     .build()?;
///
/// let admin = RequestContext::with_token("secret");
/// let poll = service.create_poll(&admin, "Favorite color?")?;
/// service.submit_response(&poll.code, "Blue is great")?;
///
/// let closed = service.close_poll(&admin, poll.id)?;
/// assert_eq!(closed.status(), PollStatus::Closed);
///
/// # Ok::<(), PollError>(())
/// ```
pub struct PollServiceBuilder {
    pub(crate) _config: ServiceConfig,
    pub(crate) _repository: Option<Arc<dyn PollRepository>>,
    pub(crate) _summaries: Option<Arc<dyn SummaryProvider>>,
    pub(crate) _access: Option<Arc<dyn AccessCheck>>,
    pub(crate) _rng: Option<Box<dyn RngCore + Send>>,
}

impl PollServiceBuilder {
    pub fn new(config: &ServiceConfig) -> PollServiceBuilder {
        PollServiceBuilder {
            _config: config.clone(),
            _repository: None,
            _summaries: None,
            _access: None,
            _rng: None,
        }
    }

    pub fn repository(self, repository: Arc<dyn PollRepository>) -> PollServiceBuilder {
        PollServiceBuilder {
            _repository: Some(repository),
            ..self
        }
    }

    pub fn summaries(self, summaries: Arc<dyn SummaryProvider>) -> PollServiceBuilder {
        PollServiceBuilder {
            _summaries: Some(summaries),
            ..self
        }
    }

    pub fn access(self, access: Arc<dyn AccessCheck>) -> PollServiceBuilder {
        PollServiceBuilder {
            _access: Some(access),
            ..self
        }
    }

    /// The random source used for poll codes. Pass a seeded generator to get
    /// reproducible codes.
    pub fn rng<R: RngCore + Send + 'static>(self, rng: R) -> PollServiceBuilder {
        PollServiceBuilder {
            _rng: Some(Box::new(rng)),
            ..self
        }
    }

    pub fn build(self) -> PollResult<PollService> {
        let access = match self._access {
            Some(a) => a,
            None => {
                return ValidationSnafu {
                    reason: "an access check is required to build the poll service",
                }
                .fail()
            }
        };
        Ok(PollService {
            repo: self
                ._repository
                .unwrap_or_else(|| Arc::new(MemoryRepository::new())),
            summaries: self
                ._summaries
                .unwrap_or_else(|| Arc::new(StatisticalSummaryProvider::default())),
            access,
            rng: Mutex::new(
                self._rng
                    .unwrap_or_else(|| Box::new(StdRng::from_entropy())),
            ),
            config: self._config,
            locks: PollLocks::default(),
        })
    }
}
