// Email delivery through an HTTP mail API.
use crate::config::EmailConfig;
use crate::model::NotifyError;
use crate::notifier::Notifier;
use reqwest::Client;
use std::time::Duration;
use tracing::info;

pub struct EmailNotifier {
    client: Client,
    api_base_url: String,
    api_key: String,
    sender: String,
    recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn new(cfg: &EmailConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            api_base_url: cfg.api_base_url.clone(),
            api_key: cfg.api_key.clone(),
            sender: cfg.sender.clone(),
            recipients: cfg.recipients.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!("{}/messages", self.api_base_url);

        let params = [
            ("from", self.sender.clone()),
            ("to", self.recipients.join(",")),
            ("subject", subject.to_string()),
            ("text", body.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }

        info!("Sent \"{}\" to {} recipient(s)", subject, self.recipients.len());
        Ok(())
    }
}
