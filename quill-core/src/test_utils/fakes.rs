//! Recording fakes for the external ports

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::core_access::MediaLocator;
use crate::ports::{
    CredentialIssuer, CredentialPair, IdentityVerifier, Mailer, ObjectStore, PortError,
    PortResult,
};

/// A message handed to [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMail {
    pub to: String,
    pub template: String,
    pub subject: String,
    pub data: serde_json::Value,
}

/// Mailer that keeps every message it was asked to send
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_with_template(&self, template: &str) -> Vec<SentMail> {
        self.sent()
            .into_iter()
            .filter(|m| m.template == template)
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        template: &str,
        subject: &str,
        data: &serde_json::Value,
    ) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::Mail("mail server unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMail {
                to: to.to_string(),
                template: template.to_string(),
                subject: subject.to_string(),
                data: data.clone(),
            });
        }
        Ok(())
    }
}

/// Object store that records deletions and fails for chosen public ids
///
/// Also tracks how many deletes overlapped at most.
#[derive(Debug, Default)]
pub struct FakeObjectStore {
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delete takes `delay` before completing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Most deletes that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_for(&self, public_id: impl Into<String>) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(public_id.into());
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn delete(&self, locator: &MediaLocator) -> PortResult<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fails = self
            .failing
            .lock()
            .map(|f| f.contains(&locator.public_id))
            .unwrap_or(false);
        if fails {
            return Err(PortError::Storage(format!(
                "cannot delete {}",
                locator.public_id
            )));
        }
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(locator.public_id.clone());
        }
        Ok(())
    }
}

/// Identity port with a fixed credential table
///
/// Issued credentials are `access:<email>` / `refresh:<email>` and verify
/// back to the same email.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    credentials: Mutex<HashMap<String, String>>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `credential` as belonging to `email`
    pub fn grant(&self, credential: impl Into<String>, email: impl Into<String>) {
        if let Ok(mut credentials) = self.credentials.lock() {
            credentials.insert(credential.into(), email.into());
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify(&self, credential: &str) -> PortResult<String> {
        let credential = credential.strip_prefix("Bearer ").unwrap_or(credential);
        self.credentials
            .lock()
            .ok()
            .and_then(|c| c.get(credential).cloned())
            .ok_or_else(|| PortError::InvalidCredential("unknown credential".to_string()))
    }
}

#[async_trait]
impl CredentialIssuer for StaticIdentity {
    async fn issue(&self, email: &str) -> PortResult<CredentialPair> {
        let pair = CredentialPair {
            access_token: format!("access:{}", email),
            refresh_token: format!("refresh:{}", email),
        };
        self.grant(pair.access_token.clone(), email);
        Ok(pair)
    }
}
