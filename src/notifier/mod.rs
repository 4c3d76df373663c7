pub mod email;

pub use email::EmailNotifier;

use crate::model::NotifyError;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}
