use crate::openpoll::*;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use snafu::prelude::*;

use serde::{Deserialize, Serialize};

/// Text stored as the summary when summaries are turned off.
pub const SUMMARIES_DISABLED_TEXT: &str = "Summaries are disabled for this installation.";

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationSettings {
    pub min_count: Option<u64>,
    pub max_terms: Option<usize>,
    pub tiebreak_mode: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarySettings {
    pub provider: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Eq, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPollConfig {
    pub store: Option<String>,
    pub admin_password: Option<String>,
    pub aggregation: Option<AggregationSettings>,
    pub summary: Option<SummarySettings>,
}

// Secrets stay out of the logs.
impl std::fmt::Debug for OpenPollConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenPollConfig")
            .field("store", &self.store)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "***"))
            .field("aggregation", &self.aggregation)
            .field(
                "summary",
                &self.summary.as_ref().map(|s| (&s.provider, &s.endpoint, s.timeout_secs)),
            )
            .finish()
    }
}

/// Reads the configuration file. Without a file, all the defaults apply.
pub fn read_config(path: Option<&str>) -> CliResult<OpenPollConfig> {
    match path {
        None => Ok(OpenPollConfig::default()),
        Some(p) => {
            let contents = fs::read_to_string(p).context(OpeningJsonSnafu { path: p })?;
            let config: OpenPollConfig =
                serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: p })?;
            Ok(config)
        }
    }
}

fn tiebreak_mode(s: &str) -> CliResult<TieBreakMode> {
    match s {
        "alphabetical" => Ok(TieBreakMode::Alphabetical),
        "firstSeen" => Ok(TieBreakMode::FirstSeen),
        x => whatever!("unknown tiebreak mode: {}", x),
    }
}

/// Checks the settings and turns them into the rules of the service.
pub fn validate_config(config: &OpenPollConfig) -> CliResult<ServiceConfig> {
    let mut res = ServiceConfig::default();
    if let Some(agg) = &config.aggregation {
        if let Some(n) = agg.min_count {
            if n == 0 {
                whatever!("aggregation.minCount must be at least 1");
            }
            res.aggregation.min_count = n;
        }
        if let Some(n) = agg.max_terms {
            if n == 0 {
                whatever!("aggregation.maxTerms must be at least 1");
            }
            res.aggregation.max_terms = n;
        }
        if let Some(s) = &agg.tiebreak_mode {
            res.aggregation.tiebreak_mode = tiebreak_mode(s)?;
        }
    }
    if let Some(secs) = config.summary.as_ref().and_then(|s| s.timeout_secs) {
        if secs == 0 {
            whatever!("summary.timeoutSecs must be at least 1");
        }
        res.summary_timeout = Some(Duration::from_secs(secs));
    }
    Ok(res)
}

pub fn build_summary_provider(
    settings: Option<&SummarySettings>,
    service_config: &ServiceConfig,
) -> CliResult<Arc<dyn SummaryProvider>> {
    let provider = settings
        .and_then(|s| s.provider.clone())
        .unwrap_or_else(|| "statistical".to_string());
    debug!("build_summary_provider: {}", provider);
    match provider.as_str() {
        "statistical" => Ok(Arc::new(StatisticalSummaryProvider::default())),
        "none" => Ok(Arc::new(FixedSummaryProvider::new(SUMMARIES_DISABLED_TEXT))),
        "http" => {
            let endpoint = match settings.and_then(|s| s.endpoint.clone()) {
                Some(e) => e,
                None => whatever!("summary.endpoint is required by the http provider"),
            };
            let api_key = settings.and_then(|s| s.api_key.clone());
            let p = HttpSummaryProvider::new(&endpoint, api_key, service_config.summary_timeout)
                .context(SummarySnafu {})?;
            Ok(Arc::new(p))
        }
        x => whatever!("unknown summary provider: {}", x),
    }
}
