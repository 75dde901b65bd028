use std::sync::Arc;

use async_trait::async_trait;

use super::{NotifyError, Notifier};
use crate::config::SmsConfig;

/// Twilio-style SMS delivery: form POST with basic auth.
pub struct SmsNotifier {
    http_client: Arc<reqwest::Client>,
    config: SmsConfig,
}

impl SmsNotifier {
    pub fn new(http_client: Arc<reqwest::Client>, config: SmsConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.api_key))
            .form(&[
                ("To", destination),
                ("From", self.config.from_number.as_str()),
                ("Body", message),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        tracing::info!(destination = %destination, "Delivered SMS");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier_for(server: &MockServer) -> SmsNotifier {
        SmsNotifier::new(
            Arc::new(reqwest::Client::new()),
            SmsConfig {
                api_key: "secret".into(),
                account_sid: "AC123".into(),
                from_number: "+15550000000".into(),
                base_url: server.uri(),
            },
        )
    }

    #[tokio::test]
    async fn test_send_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15551234567"))
            .and(body_string_contains("Body=hello"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        notifier_for(&server)
            .send("+15551234567", "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid number"))
            .mount(&server)
            .await;

        let err = notifier_for(&server)
            .send("bogus", "hello")
            .await
            .unwrap_err();
        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
