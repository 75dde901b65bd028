pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SmsConfig;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a rendered message to a destination (a phone number today).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError>;
}

/// Development notifier used when no SMS credential is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(destination = %destination, message = %message, "Mock SMS sent");
        Ok(())
    }
}

pub fn resolve_notifier(
    sms: Option<&SmsConfig>,
    http_client: &Arc<reqwest::Client>,
) -> Arc<dyn Notifier> {
    match sms {
        Some(config) => {
            tracing::info!(account = %config.account_sid, "Using SMS notifier");
            Arc::new(sms::SmsNotifier::new(Arc::clone(http_client), config.clone()))
        }
        None => {
            tracing::warn!("SMS credentials not configured, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    }
}
