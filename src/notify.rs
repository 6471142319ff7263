use async_trait::async_trait;
use tracing::info;

/// Outbound notices about account changes. Delivery is fire-and-forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn password_changed(&self, email: &str, full_name: Option<&str>) -> anyhow::Result<()>;
}

/// Writes notices to the log instead of a mail transport.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn password_changed(&self, email: &str, full_name: Option<&str>) -> anyhow::Result<()> {
        info!(
            email = %email,
            full_name = full_name.unwrap_or(""),
            notice = "password_changed",
            "notification queued"
        );
        Ok(())
    }
}
