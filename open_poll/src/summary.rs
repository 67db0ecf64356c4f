//! Narrative summaries of the responses collected by a poll.
//!
//! The engine only knows the [`SummaryProvider`] contract. A provider that fails
//! never blocks the close of a poll: [`resolve_summary`] replaces the failure by
//! [`SUMMARY_FAILED_PLACEHOLDER`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::*;

/// Stored when a closed poll had no response at all.
pub const NO_RESPONSES_PLACEHOLDER: &str = "No responses to summarize.";

/// Stored when the provider failed while closing the poll.
pub const SUMMARY_FAILED_PLACEHOLDER: &str =
    "The summary could not be generated. The word frequencies are still available.";

pub trait SummaryProvider: Send + Sync {
    /// Produces a summary of the responses to a question.
    ///
    /// Any downstream problem (transport, quota, malformed output) is reported as
    /// `SummaryError::ServiceUnavailable`.
    fn summarize(&self, question: &str, responses: &[String]) -> Result<String, SummaryError>;
}

/// Calls the provider, giving up after `timeout` if one is set.
///
/// The call runs on a helper thread when a timeout is requested. A call that misses
/// its deadline is reported as unavailable and its eventual result is discarded.
pub fn summarize_with_timeout(
    provider: &Arc<dyn SummaryProvider>,
    question: &str,
    responses: &[String],
    timeout: Option<Duration>,
) -> Result<String, SummaryError> {
    let timeout = match timeout {
        None => return provider.summarize(question, responses),
        Some(t) => t,
    };

    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(provider);
    let q = question.to_string();
    let rs = responses.to_vec();
    thread::Builder::new()
        .name("summary-provider".to_string())
        .spawn(move || {
            // The receiver is gone if the deadline already passed.
            let _ = tx.send(worker.summarize(&q, &rs));
        })
        .map_err(|e| SummaryError::ServiceUnavailable {
            reason: format!("could not start the summary worker: {}", e),
        })?;

    match rx.recv_timeout(timeout) {
        Ok(res) => res,
        Err(mpsc::RecvTimeoutError::Timeout) => ServiceUnavailableSnafu {
            reason: format!("no summary after {:?}", timeout),
        }
        .fail(),
        Err(mpsc::RecvTimeoutError::Disconnected) => ServiceUnavailableSnafu {
            reason: "the summary worker stopped without answering",
        }
        .fail(),
    }
}

/// The text stored in `summary_text` when a poll closes.
///
/// No response short-circuits to [`NO_RESPONSES_PLACEHOLDER`] without calling the
/// provider. A provider failure is logged and replaced by [`SUMMARY_FAILED_PLACEHOLDER`].
pub fn resolve_summary(
    provider: &Arc<dyn SummaryProvider>,
    question: &str,
    responses: &[String],
    timeout: Option<Duration>,
) -> String {
    if responses.is_empty() {
        debug!("resolve_summary: no responses, provider not called");
        return NO_RESPONSES_PLACEHOLDER.to_string();
    }
    match summarize_with_timeout(provider, question, responses, timeout) {
        Ok(text) => text,
        Err(e) => {
            warn!("resolve_summary: {}, storing the placeholder", e);
            SUMMARY_FAILED_PLACEHOLDER.to_string()
        }
    }
}

// ******** Providers *********

/// Always answers the same thing. Counts how many times it was called.
#[derive(Debug)]
pub struct FixedSummaryProvider {
    outcome: Result<String, String>,
    calls: AtomicUsize,
}

impl FixedSummaryProvider {
    pub fn new(text: &str) -> FixedSummaryProvider {
        FixedSummaryProvider {
            outcome: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> FixedSummaryProvider {
        FixedSummaryProvider {
            outcome: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SummaryProvider for FixedSummaryProvider {
    fn summarize(&self, _question: &str, _responses: &[String]) -> Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(text) => Ok(text.clone()),
            Err(reason) => ServiceUnavailableSnafu {
                reason: reason.clone(),
            }
            .fail(),
        }
    }
}

/// A local summary made of simple statistics and a few sample responses.
#[derive(Debug, Clone, Default)]
pub struct StatisticalSummaryProvider {}

impl StatisticalSummaryProvider {
    pub const MAX_SAMPLES: usize = 3;

    // Evenly spread over the responses, so the same input always gives the same summary.
    fn samples(responses: &[String]) -> Vec<&String> {
        let n = responses.len();
        let k = n.min(Self::MAX_SAMPLES);
        (0..k).map(|i| &responses[i * n / k]).collect()
    }
}

impl SummaryProvider for StatisticalSummaryProvider {
    fn summarize(&self, question: &str, responses: &[String]) -> Result<String, SummaryError> {
        if responses.is_empty() {
            return Ok(NO_RESPONSES_PLACEHOLDER.to_string());
        }
        let total_chars: usize = responses.iter().map(|r| r.chars().count()).sum();
        let avg = (total_chars as f64 / responses.len() as f64).round() as u64;
        let samples: Vec<String> = Self::samples(responses)
            .iter()
            .map(|s| format!("\"{}\"", s))
            .collect();
        let plural = if responses.len() == 1 { "" } else { "s" };
        Ok(format!(
            "The question \"{}\" received {} response{}. The average response length was {} characters.\n\nHere are some sample responses:\n{}",
            question,
            responses.len(),
            plural,
            avg,
            samples.join("\n")
        ))
    }
}

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    question: &'a str,
    responses: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SummaryReply {
    summary: String,
}

/// Delegates to a remote text-generation service over HTTP.
///
/// The service receives `{"question": ..., "responses": [...]}` as JSON and is expected
/// to answer `{"summary": ...}`.
#[derive(Debug, Clone)]
pub struct HttpSummaryProvider {
    client: reqwest::blocking::Client,
    endpoint: reqwest::Url,
    api_key: Option<String>,
}

impl HttpSummaryProvider {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<HttpSummaryProvider, SummaryError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            SummaryError::ServiceUnavailable {
                reason: format!("invalid summary endpoint {:?}: {}", endpoint, e),
            }
        })?;
        let mut builder = reqwest::blocking::Client::builder();
        // A summarizer on this machine is never reached through a proxy.
        if endpoint.host_str().map(is_loopback_host).unwrap_or(false) {
            builder = builder.no_proxy();
        }
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| SummaryError::ServiceUnavailable {
            reason: format!("could not build the HTTP client: {}", e),
        })?;
        info!("Summary provider: {}", endpoint);
        Ok(HttpSummaryProvider {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> SummaryError {
        let reason = if err.is_timeout() {
            format!("request to {} timed out", self.endpoint)
        } else if err.is_connect() {
            format!("cannot connect to {}", self.endpoint)
        } else if err.is_decode() {
            format!("malformed answer from {}: {}", self.endpoint, err)
        } else {
            err.to_string()
        };
        SummaryError::ServiceUnavailable { reason }
    }
}

fn is_loopback_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

impl SummaryProvider for HttpSummaryProvider {
    fn summarize(&self, question: &str, responses: &[String]) -> Result<String, SummaryError> {
        debug!(
            "HttpSummaryProvider: sending {} responses to {}",
            responses.len(),
            self.endpoint
        );
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .json(&SummaryRequest {
                question,
                responses,
            });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().map_err(|e| self.map_reqwest_error(e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return ServiceUnavailableSnafu {
                reason: format!("HTTP {} from {}: {}", status.as_u16(), self.endpoint, body),
            }
            .fail();
        }
        let reply: SummaryReply = resp.json().map_err(|e| self.map_reqwest_error(e))?;
        let text = reply.summary.trim();
        if text.is_empty() {
            return ServiceUnavailableSnafu {
                reason: format!("empty summary from {}", self.endpoint),
            }
            .fail();
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider(Duration);

    impl SummaryProvider for SlowProvider {
        fn summarize(&self, _q: &str, _r: &[String]) -> Result<String, SummaryError> {
            thread::sleep(self.0);
            Ok("late".to_string())
        }
    }

    fn texts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_responses_skip_the_provider() {
        let fixed = Arc::new(FixedSummaryProvider::new("unused"));
        let provider: Arc<dyn SummaryProvider> = fixed.clone();
        let res = resolve_summary(&provider, "Why?", &[], None);
        assert_eq!(res, NO_RESPONSES_PLACEHOLDER);
        assert_eq!(fixed.calls(), 0);
    }

    #[test]
    fn failure_becomes_placeholder() {
        let fixed = Arc::new(FixedSummaryProvider::failing("quota exceeded"));
        let provider: Arc<dyn SummaryProvider> = fixed.clone();
        let res = resolve_summary(&provider, "Why?", &texts(&["because"]), None);
        assert_eq!(res, SUMMARY_FAILED_PLACEHOLDER);
        assert_eq!(fixed.calls(), 1);
    }

    #[test]
    fn success_is_passed_through() {
        let provider: Arc<dyn SummaryProvider> = Arc::new(FixedSummaryProvider::new("All good."));
        let res = resolve_summary(&provider, "Why?", &texts(&["because"]), None);
        assert_eq!(res, "All good.");
    }

    #[test]
    fn timeout_is_unavailable() {
        let provider: Arc<dyn SummaryProvider> =
            Arc::new(SlowProvider(Duration::from_millis(500)));
        let res = summarize_with_timeout(
            &provider,
            "Why?",
            &texts(&["because"]),
            Some(Duration::from_millis(20)),
        );
        assert!(matches!(res, Err(SummaryError::ServiceUnavailable { .. })));
    }

    #[test]
    fn answer_within_deadline() {
        let provider: Arc<dyn SummaryProvider> = Arc::new(SlowProvider(Duration::from_millis(1)));
        let res = summarize_with_timeout(
            &provider,
            "Why?",
            &texts(&["because"]),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(res.unwrap(), "late");
    }

    #[test]
    fn statistical_summary() {
        let p = StatisticalSummaryProvider::default();
        let res = p
            .summarize("Favorite color?", &texts(&["blue", "green", "red", "yellow!"]))
            .unwrap();
        assert!(res.contains("received 4 responses"));
        // (4 + 5 + 3 + 7) / 4 = 4.75
        assert!(res.contains("average response length was 5 characters"));
        // Samples at indices 0, 1 and 2.
        assert!(res.contains("\"blue\"\n\"green\"\n\"red\""));
        assert!(!res.contains("yellow"));
    }

    #[test]
    fn statistical_summary_single() {
        let p = StatisticalSummaryProvider::default();
        let res = p.summarize("Why?", &texts(&["because"])).unwrap();
        assert!(res.contains("received 1 response."));
        assert!(res.contains("\"because\""));
    }

    #[test]
    fn http_provider_rejects_bad_endpoint() {
        let res = HttpSummaryProvider::new("not a url", None, None);
        assert!(matches!(res, Err(SummaryError::ServiceUnavailable { .. })));
    }

    #[test]
    fn http_provider_builds() {
        let p = HttpSummaryProvider::new(
            "http://localhost:9/summarize",
            Some("secret".to_string()),
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        assert_eq!(p.endpoint(), "http://localhost:9/summarize");
    }

    // Serves one canned HTTP reply on a local port and hands back the request it got.
    fn serve_once(status: &str, body: &str) -> (String, thread::JoinHandle<String>) {
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/summarize", listener.local_addr().unwrap());
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();
            let mut stream = reader.into_inner();
            stream.write_all(reply.as_bytes()).unwrap();
            stream.flush().unwrap();
            format!("{}{}", head, String::from_utf8_lossy(&request_body))
        });
        (url, handle)
    }

    fn http_provider(url: &str) -> HttpSummaryProvider {
        HttpSummaryProvider::new(url, Some("k-123".to_string()), Some(Duration::from_secs(5)))
            .unwrap()
    }

    #[test]
    fn loopback_hosts() {
        assert!(is_loopback_host("localhost"));
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("[::1]"));
        assert!(!is_loopback_host("summaries.example.com"));
        assert!(!is_loopback_host("10.0.0.7"));
    }

    #[test]
    fn http_provider_passes_the_summary_through() {
        let (url, server) = serve_once("200 OK", r#"{"summary":"  ok  "}"#);
        let res = http_provider(&url).summarize("Why?", &texts(&["because", "just so"]));
        assert_eq!(res.unwrap(), "ok");

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /summarize"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer k-123"));
        assert!(request.contains(r#"{"question":"Why?","responses":["because","just so"]}"#));
    }

    #[test]
    fn http_provider_error_status() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#);
        let res = http_provider(&url).summarize("Why?", &texts(&["because"]));
        server.join().unwrap();
        match res {
            Err(SummaryError::ServiceUnavailable { reason }) => assert!(reason.contains("HTTP 500")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn http_provider_malformed_reply() {
        let (url, server) = serve_once("200 OK", r#"{"nope":1}"#);
        let res = http_provider(&url).summarize("Why?", &texts(&["because"]));
        server.join().unwrap();
        assert!(matches!(res, Err(SummaryError::ServiceUnavailable { .. })));
    }

    #[test]
    fn http_provider_blank_summary() {
        let (url, server) = serve_once("200 OK", r#"{"summary":"  "}"#);
        let res = http_provider(&url).summarize("Why?", &texts(&["because"]));
        server.join().unwrap();
        match res {
            Err(SummaryError::ServiceUnavailable { reason }) => {
                assert!(reason.contains("empty summary"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn http_provider_connection_refused() {
        // Grab a free port, then close it.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}/summarize", port);
        let res = http_provider(&url).summarize("Why?", &texts(&["because"]));
        assert!(matches!(res, Err(SummaryError::ServiceUnavailable { .. })));
    }

    #[test]
    fn http_failure_closes_with_placeholder() {
        let (url, server) = serve_once("503 Service Unavailable", "");
        let provider: Arc<dyn SummaryProvider> = Arc::new(http_provider(&url));
        let res = resolve_summary(&provider, "Why?", &texts(&["because"]), None);
        server.join().unwrap();
        assert_eq!(res, SUMMARY_FAILED_PLACEHOLDER);
    }
}
