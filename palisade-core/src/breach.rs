//! k-anonymity breach lookups against a Have I Been Pwned style range API.
//!
//! Only the first [`PREFIX_LEN`] characters of a password's SHA-1
//! fingerprint ever leave the process. The endpoint answers with every
//! suffix in that range and matching happens locally.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha1::{Digest, Sha1};
use tokio::sync::Semaphore;

use crate::{Result, VaultError};

/// Characters of the fingerprint sent to the range endpoint.
pub const PREFIX_LEN: usize = 5;

/// Lookups kept in flight by [`check_batch`] unless the caller says otherwise.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

/// Uppercase hex SHA-1 fingerprint of a password.
pub(crate) fn fingerprint(password: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(password))
}

/// A k-anonymity range endpoint: takes a fingerprint prefix and returns
/// the newline-separated `SUFFIX:COUNT` body for that range.
pub trait RangeLookup: Send + Sync {
    fn lookup(&self, prefix: &str) -> impl Future<Output = Result<String>> + Send;
}

/// HTTP client for the Have I Been Pwned password range API.
pub struct HibpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HibpClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.pwnedpasswords.com/range";

    pub fn new() -> Result<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL)
    }

    /// Point the client at a different range endpoint.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| VaultError::BreachCheckUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RangeLookup for HibpClient {
    async fn lookup(&self, prefix: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, prefix);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VaultError::BreachCheckUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(VaultError::BreachCheckUnavailable(format!(
                "range endpoint returned {}",
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| VaultError::BreachCheckUnavailable(e.to_string()))
    }
}

/// How many times `password` appears in known breaches. Zero means the
/// range was searched and the password was not in it; an unreachable or
/// malformed endpoint is an error, never zero.
pub async fn check_password(password: &[u8], lookup: &impl RangeLookup) -> Result<u64> {
    let fp = fingerprint(password);
    let (prefix, suffix) = fp.split_at(PREFIX_LEN);
    let body = lookup.lookup(prefix).await?;
    count_in_range(&body, suffix)
}

fn count_in_range(body: &str, suffix: &str) -> Result<u64> {
    let mut total = 0u64;
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (candidate, count) = line.split_once(':').ok_or_else(|| malformed(line))?;
        let count: u64 = count.trim().parse().map_err(|_| malformed(line))?;
        if candidate.trim().eq_ignore_ascii_case(suffix) {
            total = total.saturating_add(count);
        }
    }
    Ok(total)
}

fn malformed(line: &str) -> VaultError {
    VaultError::BreachCheckUnavailable(format!("malformed range response line {line:?}"))
}

/// Cooperative cancellation for a running batch check.
#[derive(Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one credential's lookup within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Lookup completed; the password appeared this many times.
    Checked(u64),
    /// Lookup failed; the count is unknown, not zero.
    Failed(String),
    /// The batch was aborted before this lookup started.
    Aborted,
}

/// One credential's slot in a batch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCheck {
    pub record_id: i64,
    pub status: BatchStatus,
}

/// Check many passwords with at most `concurrency` lookups in flight.
///
/// One [`RecordCheck`] comes back per candidate, in input order. A failed
/// lookup lands in its own slot without stopping the rest, and raising
/// `abort` marks every not-yet-started slot [`BatchStatus::Aborted`].
pub async fn check_batch<C>(
    client: Arc<C>,
    candidates: Vec<(i64, Vec<u8>)>,
    concurrency: usize,
    abort: AbortFlag,
) -> Result<Vec<RecordCheck>>
where
    C: RangeLookup + 'static,
{
    if concurrency == 0 {
        return Err(VaultError::InvalidInput(
            "breach batch concurrency must be at least 1".to_string(),
        ));
    }

    let ids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(candidates.len());

    for (idx, (_, password)) in candidates.into_iter().enumerate() {
        if abort.is_aborted() {
            break;
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| VaultError::BreachCheckUnavailable("lookup pool closed".to_string()))?;
        let client = client.clone();
        let abort = abort.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit; // released when the lookup completes
            if abort.is_aborted() {
                return BatchStatus::Aborted;
            }
            match check_password(&password, client.as_ref()).await {
                Ok(count) => BatchStatus::Checked(count),
                Err(err) => BatchStatus::Failed(err.to_string()),
            }
        });
        handles.push((idx, handle));
    }

    // Slots never issued keep their Aborted marker.
    let mut statuses = vec![BatchStatus::Aborted; ids.len()];
    for (idx, handle) in handles {
        statuses[idx] = match handle.await {
            Ok(status) => status,
            Err(err) => BatchStatus::Failed(format!("lookup task failed: {err}")),
        };
    }

    Ok(ids
        .into_iter()
        .zip(statuses)
        .map(|(record_id, status)| RecordCheck { record_id, status })
        .collect())
}
