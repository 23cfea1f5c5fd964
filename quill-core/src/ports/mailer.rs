//! Mail delivery

use async_trait::async_trait;
use tracing::info;

use super::{Mailer, PortResult};

/// Mailer that records each notification as a structured log line.
///
/// Stands in for SMTP delivery, which runs outside this service.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        to: &str,
        template: &str,
        subject: &str,
        data: &serde_json::Value,
    ) -> PortResult<()> {
        info!(to, template, subject, data = %data, "Mail dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let mailer = LogMailer::new();
        let data = serde_json::json!({ "link": "http://localhost:3000/invite/abc" });
        assert!(mailer.send("x@y.com", "invite", "Join", &data).await.is_ok());
    }
}
