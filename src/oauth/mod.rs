//! Dashboard-initiated provider logins.
//!
//! An [`OAuthFlow`] owns the background task polling the backend for the
//! outcome. Dropping or cancelling the handle aborts the task, so a session
//! never leaves a timer behind.

pub mod poller;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::types::FlowStart;
use crate::api::{ManagementClient, OAuthProvider};
pub use poller::{FlowState, PollPlan};

pub struct OAuthFlow {
    provider: OAuthProvider,
    start: FlowStart,
    state_tx: Arc<watch::Sender<FlowState>>,
    state_rx: watch::Receiver<FlowState>,
    task: Option<JoinHandle<()>>,
}

impl OAuthFlow {
    /// Begin observing a flow the backend just initiated
    pub fn begin(client: &ManagementClient, provider: OAuthProvider, start: FlowStart) -> Self {
        let (tx, rx) = watch::channel(FlowState::Started);
        let state_tx = Arc::new(tx);

        let task = match &start {
            FlowStart::Redirect {
                state: Some(state), ..
            } => {
                let client = client.clone();
                let state = state.clone();
                Some(tokio::spawn(poller::run(
                    PollPlan::redirect(),
                    move || {
                        let client = client.clone();
                        let state = state.clone();
                        async move { client.auth_status(&state).await }
                    },
                    state_tx.clone(),
                )))
            }
            FlowStart::Device {
                device_code,
                interval,
                expires_in,
                ..
            } => {
                let client = client.clone();
                let device_code = device_code.clone();
                Some(tokio::spawn(poller::run(
                    PollPlan::device(*interval, *expires_in),
                    move || {
                        let client = client.clone();
                        let device_code = device_code.clone();
                        async move { client.copilot_token_status(&device_code).await }
                    },
                    state_tx.clone(),
                )))
            }
            // Nothing to poll; the operator finishes in the provider's window
            FlowStart::Redirect { state: None, .. } => None,
        };

        info!("Started {} login flow", provider.label());
        Self {
            provider,
            start,
            state_tx,
            state_rx: rx,
            task,
        }
    }

    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }

    pub fn start(&self) -> &FlowStart {
        &self.start
    }

    pub fn state(&self) -> FlowState {
        self.state_rx.borrow().clone()
    }

    /// Receiver for waiting on state changes
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state_rx.clone()
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if poller::publish(&self.state_tx, FlowState::Cancelled) {
            info!("Cancelled {} login flow", self.provider.label());
        }
    }
}

impl Drop for OAuthFlow {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for OAuthFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthFlow")
            .field("provider", &self.provider)
            .field("state", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}
