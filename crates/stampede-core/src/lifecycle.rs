//! Run lifecycle events and their observers.
//!
//! The engine drives a [`RunLifecycle`] through `start`, any number of `request`
//! events, and `stop`. Observers see the events in that order and in registration
//! order; events that arrive outside a running window are dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Completion of one request issued by a simulated user.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub method: String,
    pub name: String,
    pub response_time_ms: f64,
    pub response_length: u64,
    /// Failure description; `None` for a successful request.
    pub error: Option<String>,
}

impl RequestEvent {
    pub fn success(
        method: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: f64,
        response_length: u64,
    ) -> Self {
        Self {
            method: method.into(),
            name: name.into(),
            response_time_ms,
            response_length,
            error: None,
        }
    }

    pub fn failure(
        method: impl Into<String>,
        name: impl Into<String>,
        response_time_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            name: name.into(),
            response_time_ms,
            response_length: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Live state of the run shared with observers.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    user_count: Arc<AtomicUsize>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of concurrent simulated users.
    pub fn user_count(&self) -> usize {
        self.user_count.load(Ordering::Relaxed)
    }

    pub fn set_user_count(&self, users: usize) {
        self.user_count.store(users, Ordering::Relaxed);
    }
}

/// Receives run lifecycle events. All callbacks default to no-ops.
#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn on_test_start(&self, _ctx: &RunContext) {}

    async fn on_request(&self, _event: &RequestEvent) {}

    async fn on_test_stop(&self, _ctx: &RunContext) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Dispatches lifecycle events to registered observers.
pub struct RunLifecycle {
    observers: Vec<Arc<dyn RunObserver>>,
    state: Mutex<RunState>,
    context: RunContext,
}

impl Default for RunLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLifecycle {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            state: Mutex::new(RunState::Idle),
            context: RunContext::new(),
        }
    }

    pub fn register(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub async fn start(&self) -> CoreResult<()> {
        self.transition(RunState::Idle, RunState::Running)?;
        debug!(observers = self.observers.len(), "Run started");
        for observer in &self.observers {
            observer.on_test_start(&self.context).await;
        }
        Ok(())
    }

    /// Deliver a request event. Returns `false` when the run is not active.
    pub async fn request(&self, event: RequestEvent) -> bool {
        let state = self.state();
        if state != RunState::Running {
            warn!(?state, name = %event.name, "Dropping request event outside a running test");
            return false;
        }
        for observer in &self.observers {
            observer.on_request(&event).await;
        }
        true
    }

    pub async fn stop(&self) -> CoreResult<()> {
        self.transition(RunState::Running, RunState::Stopped)?;
        for observer in &self.observers {
            observer.on_test_stop(&self.context).await;
        }
        debug!("Run stopped");
        Ok(())
    }

    fn transition(&self, from: RunState, to: RunState) -> CoreResult<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(CoreError::invalid_state(format!(
                "cannot move run from {:?} to {to:?}",
                *state
            )));
        }
        *state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RunObserver for Recorder {
        async fn on_test_start(&self, ctx: &RunContext) {
            self.events.lock().push(format!("start:{}", ctx.user_count()));
        }

        async fn on_request(&self, event: &RequestEvent) {
            self.events.lock().push(format!("request:{}", event.name));
        }

        async fn on_test_stop(&self, _ctx: &RunContext) {
            self.events.lock().push("stop".to_string());
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut lifecycle = RunLifecycle::new();
        lifecycle.register(recorder.clone());

        lifecycle.context().set_user_count(4);
        lifecycle.start().await.unwrap();
        assert!(lifecycle.request(RequestEvent::success("GET", "/home", 12.5, 512)).await);
        lifecycle.stop().await.unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["start:4", "request:/home", "stop"]
        );
        assert_eq!(lifecycle.state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_requests_outside_run_are_dropped() {
        let recorder = Arc::new(Recorder::default());
        let mut lifecycle = RunLifecycle::new();
        lifecycle.register(recorder.clone());

        assert!(!lifecycle.request(RequestEvent::success("GET", "/early", 1.0, 0)).await);
        lifecycle.start().await.unwrap();
        lifecycle.stop().await.unwrap();
        assert!(!lifecycle.request(RequestEvent::success("GET", "/late", 1.0, 0)).await);

        assert_eq!(*recorder.events.lock(), vec!["start:0", "stop"]);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let lifecycle = RunLifecycle::new();
        assert!(matches!(lifecycle.stop().await, Err(CoreError::InvalidState { .. })));

        lifecycle.start().await.unwrap();
        assert!(lifecycle.start().await.is_err());
    }

    #[test]
    fn test_failure_event() {
        let event = RequestEvent::failure("POST", "login", 30.0, "HTTP 500");
        assert!(!event.is_success());
        assert_eq!(event.response_length, 0);
    }
}
