use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::api::types::PollReply;
use crate::constants::{REDIRECT_MAX_ATTEMPTS, REDIRECT_POLL_INTERVAL};
use crate::error::ApiError;

/// Lifecycle of one login flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Started,
    Polling { attempts: u32 },
    Succeeded,
    Failed(String),
    TimedOut,
    Cancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Succeeded | FlowState::Failed(_) | FlowState::TimedOut | FlowState::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, FlowState::Started | FlowState::Polling { .. })
    }
}

/// Poll cadence and attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPlan {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPlan {
    pub fn redirect() -> Self {
        Self {
            interval: REDIRECT_POLL_INTERVAL,
            max_attempts: REDIRECT_MAX_ATTEMPTS,
        }
    }

    /// One attempt per `interval` until the device code expires
    pub fn device(interval_secs: u64, expires_in_secs: u64) -> Self {
        let interval_secs = interval_secs.max(1);
        let max_attempts = u32::try_from(expires_in_secs / interval_secs).unwrap_or(u32::MAX);
        Self {
            interval: Duration::from_secs(interval_secs),
            max_attempts,
        }
    }
}

/// Publish `next` unless the flow already ended
pub(crate) fn publish(state: &watch::Sender<FlowState>, next: FlowState) -> bool {
    state.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

/// Drive `check` until the backend reports an outcome or the attempts run out.
///
/// The first check fires immediately. Errors other than 401 are treated as
/// transient: they are logged, count as an attempt, and polling continues.
pub async fn run<F, Fut>(plan: PollPlan, mut check: F, state: Arc<watch::Sender<FlowState>>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollReply, ApiError>>,
{
    let mut ticker = interval(plan.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0;

    loop {
        ticker.tick().await;
        if state.borrow().is_terminal() {
            return;
        }

        if attempts >= plan.max_attempts {
            info!("OAuth flow timed out after {attempts} attempts");
            publish(&state, FlowState::TimedOut);
            return;
        }

        attempts += 1;
        publish(&state, FlowState::Polling { attempts });

        match check().await {
            Ok(PollReply::Complete) => {
                info!("OAuth flow completed after {attempts} attempts");
                publish(&state, FlowState::Succeeded);
                return;
            }
            Ok(PollReply::Failed(message)) => {
                warn!("OAuth flow failed: {message}");
                publish(&state, FlowState::Failed(message));
                return;
            }
            Ok(PollReply::Pending) => {}
            Err(ApiError::Unauthorized) => {
                publish(
                    &state,
                    FlowState::Failed("Management session expired".to_string()),
                );
                return;
            }
            Err(e) => debug!("OAuth status poll {attempts} failed: {e}"),
        }
    }
}
