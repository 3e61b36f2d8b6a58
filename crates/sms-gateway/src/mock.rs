//! In-process provider for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::SmsProvider;
use crate::error::ProviderError;
use crate::types::{ProviderStatus, SendReceipt, SendRequest};

/// A provider that records every request and answers from a script.
///
/// By default every send is accepted with status `sent`. Individual
/// destinations can be made to fail with a provider error code.
#[derive(Debug)]
pub struct RecordingProvider {
    from_number: String,
    status: ProviderStatus,
    sent: Mutex<Vec<SendRequest>>,
    failures: Mutex<HashMap<String, i64>>,
    counter: AtomicU64,
}

impl RecordingProvider {
    /// Create a provider sending from `from_number`.
    pub fn new(from_number: impl Into<String>) -> Self {
        Self {
            from_number: from_number.into(),
            status: ProviderStatus::Sent,
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// Acknowledge accepted sends with this status instead of `sent`.
    pub fn with_status(mut self, status: ProviderStatus) -> Self {
        self.status = status;
        self
    }

    /// Reject sends to `to` with the given provider error code.
    pub async fn fail_for(&self, to: impl Into<String>, code: i64) {
        self.failures.lock().await.insert(to.into(), code);
    }

    /// Every request that reached the provider, accepted or not.
    pub async fn requests(&self) -> Vec<SendRequest> {
        self.sent.lock().await.clone()
    }

    /// Number of requests that reached the provider.
    pub async fn request_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl SmsProvider for RecordingProvider {
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, ProviderError> {
        let failure = self.failures.lock().await.get(&request.to).copied();
        self.sent.lock().await.push(request);

        if let Some(code) = failure {
            return Err(ProviderError::Api {
                code,
                status: 400,
                message: format!("scripted failure {}", code),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            sid: format!("SM{:032}", n),
            status: self.status,
        })
    }

    fn from_number(&self) -> &str {
        &self.from_number
    }
}
