use std::time::Duration;

/// Every wait of a fetch session goes through a `Pacer`, so tests can
/// record the delays instead of sleeping through them.
#[async_trait::async_trait]
pub trait Pacer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait::async_trait]
impl Pacer for TokioPacer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
