//! Fan-out of reload signals to registered sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use super::protocol::ServerMessage;
use super::registry::{SessionId, SessionRegistry};

/// Outcome of one dispatch.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<SessionId>,
}

/// Delivers reload messages to every active session.
///
/// Deliveries run concurrently, each bounded by the delivery timeout. A
/// session that fails or times out is unregistered; the others are not
/// affected.
pub(crate) struct PushDispatcher {
    registry: Arc<SessionRegistry>,
    delivery_timeout: Duration,
}

impl PushDispatcher {
    pub(crate) fn new(registry: Arc<SessionRegistry>, delivery_timeout: Duration) -> Self {
        Self {
            registry,
            delivery_timeout,
        }
    }

    /// Push one `reload` to every session active right now.
    pub(crate) async fn dispatch(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        if self.registry.is_empty() {
            return report;
        }

        let timeout = self.delivery_timeout;
        let mut deliveries = JoinSet::new();
        self.registry.for_each_active(|session| {
            let id = session.id;
            let handle = session.handle.clone();
            deliveries.spawn(async move { (id, handle.deliver(ServerMessage::Reload, timeout).await) });
        });

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((id, Err(e))) => {
                    // Failing pages just stop receiving reloads
                    tracing::debug!(session = %id, error = %e, "Delivery failed, closing session");
                    self.registry.unregister(id);
                    report.failed.push(id);
                }
                Err(e) => tracing::warn!(error = %e, "Delivery task failed"),
            }
        }

        report.failed.sort();
        report
    }
}
