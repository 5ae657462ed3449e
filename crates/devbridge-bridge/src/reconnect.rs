//! Reconnect supervisor.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devbridge_core::backoff_delay;
use devbridge_protocols::actions;

use crate::bridge::MessageBridge;
use crate::handler::handler_fn;

/// Reconnect schedule.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up. Zero retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before the 1-based reconnect `attempt`. Unlike a fresh request,
    /// the first reconnect already waits `base_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        backoff_delay(attempt.saturating_add(1), self.base_delay, self.max_delay)
    }
}

/// Reopen the bridge's transport whenever it drops without being asked to.
///
/// The supervisor stops when `shutdown` is cancelled or the bridge is dropped.
pub fn spawn_reconnect(
    bridge: &Arc<MessageBridge>,
    policy: ReconnectPolicy,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<()>();
    let subscription = bridge.subscribe(
        actions::DISCONNECTED,
        handler_fn(move |message| {
            let signal_tx = signal_tx.clone();
            async move {
                if message.payload["requested"] != Value::Bool(true) {
                    let _ = signal_tx.send(());
                }
                Ok(Value::Null)
            }
        }),
    );
    let bridge = Arc::downgrade(bridge);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = signal_rx.recv() => {
                    if signal.is_none() {
                        break;
                    }
                }
            }

            let Some(bridge) = bridge.upgrade() else {
                break;
            };
            reconnect(&bridge, &policy, &shutdown).await;
            while signal_rx.try_recv().is_ok() {}
        }
        subscription.unsubscribe();
        debug!("Reconnect supervisor stopped");
    })
}

async fn reconnect(bridge: &MessageBridge, policy: &ReconnectPolicy, shutdown: &CancellationToken) {
    let mut attempt = 1;
    loop {
        if policy.max_attempts > 0 && attempt > policy.max_attempts {
            warn!("Giving up reconnecting after {} attempts", policy.max_attempts);
            return;
        }

        let delay = policy.delay_for_attempt(attempt);
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        if bridge.is_connected() {
            return;
        }
        match bridge.connect().await {
            Ok(()) => {
                info!("Transport reopened after {} attempt(s)", attempt);
                return;
            }
            Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
        }
        attempt += 1;
    }
}
