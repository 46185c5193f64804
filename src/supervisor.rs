//! Keeps one event stream alive per device.
//!
//! The supervisor is a small state machine:
//!
//! ```text
//! Connecting --ok--> Streaming --ended--> Backoff --delay--> Connecting
//!      \______________failed______________/
//! ```
//!
//! It retries forever; a powered-off device must not disable the
//! integration. The only way out is cancellation, which moves any state to
//! `Stopped` and drops the open connection.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSecondsWithFrac, serde_as};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::stream::{EventStream, StreamEnd, StreamSession};

/// Delay between a dropped stream and the next connection attempt.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Same delay every time.
    Fixed {
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        delay: Duration,
    },
    /// `initial * 2^failures`, capped at `max`. Resets once a stream opens.
    Exponential {
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        initial: Duration,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        max: Duration,
    },
}

impl Default for BackoffPolicy {
    /// Fixed five seconds.
    fn default() -> Self {
        BackoffPolicy::Fixed {
            delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect number `failures` (0 for the first).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            BackoffPolicy::Fixed { delay } => delay,
            BackoffPolicy::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(failures.min(31));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Observable phase of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Connecting,
    Streaming,
    Backoff,
    Stopped,
}

/// Published on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    /// Streams opened so far.
    pub connections: u64,
    /// Consecutive failed cycles since the last successful connect.
    pub failures: u32,
    pub last_error: Option<String>,
}

impl SupervisorStatus {
    fn initial() -> Self {
        Self {
            state: SupervisorState::Connecting,
            connections: 0,
            failures: 0,
            last_error: None,
        }
    }
}

enum Phase {
    Connecting,
    Streaming(EventStream),
    Backoff,
    Stopped,
}

impl Phase {
    fn state(&self) -> SupervisorState {
        match self {
            Phase::Connecting => SupervisorState::Connecting,
            Phase::Streaming(_) => SupervisorState::Streaming,
            Phase::Backoff => SupervisorState::Backoff,
            Phase::Stopped => SupervisorState::Stopped,
        }
    }
}

/// Drives a [`StreamSession`] through connect/stream/backoff cycles.
pub struct Supervisor<S> {
    session: Arc<S>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
    status: watch::Sender<SupervisorStatus>,
}

impl<S> Supervisor<S>
where
    S: StreamSession + 'static,
{
    /// Start supervising on a background task.
    ///
    /// `cancel` is the owner's token; the supervisor stops when it fires or
    /// when [`SupervisorHandle::stop`] is called.
    pub fn spawn(
        session: Arc<S>,
        policy: BackoffPolicy,
        cancel: &CancellationToken,
    ) -> SupervisorHandle {
        let cancel = cancel.child_token();
        let (status, status_rx) = watch::channel(SupervisorStatus::initial());
        let supervisor = Supervisor {
            session,
            policy,
            cancel: cancel.clone(),
            status,
        };
        let task = tokio::spawn(supervisor.run());
        SupervisorHandle {
            cancel,
            status: status_rx,
            task: Some(task),
        }
    }

    async fn run(self) {
        let mut phase = Phase::Connecting;
        loop {
            let state = phase.state();
            self.status.send_modify(|s| s.state = state);
            phase = match phase {
                Phase::Connecting => self.connect().await,
                Phase::Streaming(stream) => self.stream(stream).await,
                Phase::Backoff => self.backoff().await,
                Phase::Stopped => break,
            };
        }
        debug!("supervisor stopped");
    }

    async fn connect(&self) -> Phase {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Phase::Stopped,
            result = self.session.connect() => match result {
                Ok(stream) => {
                    self.status.send_modify(|s| {
                        s.connections += 1;
                        s.failures = 0;
                    });
                    Phase::Streaming(stream)
                }
                Err(e) => {
                    warn!("event stream connect failed: {e}");
                    self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                    Phase::Backoff
                }
            },
        }
    }

    async fn stream(&self, stream: EventStream) -> Phase {
        match self.session.consume(stream, &self.cancel).await {
            StreamEnd::Cancelled => Phase::Stopped,
            StreamEnd::Closed => Phase::Backoff,
            StreamEnd::Failed(e) => {
                warn!("event stream failed: {e}");
                self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                Phase::Backoff
            }
        }
    }

    async fn backoff(&self) -> Phase {
        let failures = self.status.borrow().failures;
        let delay = self.policy.delay(failures);
        self.status
            .send_modify(|s| s.failures = s.failures.saturating_add(1));
        info!("reconnecting event stream in {delay:?}");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Phase::Stopped,
            _ = tokio::time::sleep(delay) => Phase::Connecting,
        }
    }
}

/// Owner's handle on a running supervisor. Dropping it stops the task.
#[derive(Debug)]
pub struct SupervisorHandle {
    cancel: CancellationToken,
    status: watch::Receiver<SupervisorStatus>,
    task: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    /// A receiver that sees every status change.
    pub fn watch(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop and wait for the background task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("supervisor task ended abnormally: {e}");
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use futures::StreamExt;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What the fake does on each connect call.
    enum Script {
        Refuse,
        Lines(Vec<&'static str>),
        Hang,
    }

    #[derive(Default)]
    struct FakeSession {
        script: Mutex<VecDeque<Script>>,
        seen: Mutex<Vec<String>>,
        connects: Mutex<Vec<tokio::time::Instant>>,
    }

    impl FakeSession {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl StreamSession for FakeSession {
        async fn connect(&self) -> Result<EventStream, Error> {
            self.connects.lock().unwrap().push(tokio::time::Instant::now());
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Script::Hang);
            match next {
                Script::Refuse => Err(Error::StreamEnded),
                Script::Lines(lines) => Ok(stream::iter(
                    lines
                        .into_iter()
                        .map(|l| Ok(format!("{l}\n").into_bytes()))
                        .collect::<Vec<_>>(),
                )
                .boxed()),
                Script::Hang => Ok(stream::pending::<Result<Vec<u8>, Error>>().boxed()),
            }
        }

        async fn consume(&self, mut stream: EventStream, cancel: &CancellationToken) -> StreamEnd {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return StreamEnd::Cancelled,
                    chunk = stream.next() => match chunk {
                        Some(Ok(bytes)) => self
                            .seen
                            .lock()
                            .unwrap()
                            .push(String::from_utf8(bytes).unwrap().trim().to_string()),
                        Some(Err(e)) => return StreamEnd::Failed(e),
                        None => return StreamEnd::Closed,
                    },
                }
            }
        }
    }

    async fn wait_for(handle: &SupervisorHandle, f: impl Fn(&SupervisorStatus) -> bool) {
        let mut rx = handle.watch();
        rx.wait_for(|s| f(s)).await.unwrap();
    }

    #[test]
    fn test_fixed_backoff() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(5));
        assert_eq!(policy.delay(100), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let policy = BackoffPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_policy_serde() {
        let policy: BackoffPolicy =
            serde_json::from_str(r#"{"kind":"exponential","initial":0.5,"max":10}"#).unwrap();
        assert_eq!(
            policy,
            BackoffPolicy::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(10),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_backoff_and_keeps_order() {
        let session = FakeSession::new(vec![
            Script::Lines(vec!["a", "b"]),
            Script::Refuse,
            Script::Lines(vec!["c"]),
        ]);
        let handle = Supervisor::spawn(
            Arc::clone(&session),
            BackoffPolicy::default(),
            &CancellationToken::new(),
        );

        // The fourth connect hangs, so the supervisor settles in Streaming.
        wait_for(&handle, |s| s.connections == 4 && s.state == SupervisorState::Streaming).await;
        assert_eq!(session.seen(), vec!["a", "b", "c"]);

        let connects = session.connects.lock().unwrap().clone();
        assert_eq!(connects.len(), 4);
        assert!(connects[1] - connects[0] >= Duration::from_secs(5));
        assert!(connects[2] - connects[1] >= Duration::from_secs(5));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_reset_after_connect() {
        let session = FakeSession::new(vec![Script::Refuse, Script::Refuse]);
        let handle = Supervisor::spawn(
            Arc::clone(&session),
            BackoffPolicy::default(),
            &CancellationToken::new(),
        );
        wait_for(&handle, |s| s.connections == 1).await;
        let status = handle.status();
        assert_eq!(status.failures, 0);
        assert!(status.last_error.is_some());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_streaming_supervisor() {
        let session = FakeSession::new(vec![Script::Hang]);
        let parent = CancellationToken::new();
        let handle = Supervisor::spawn(Arc::clone(&session), BackoffPolicy::default(), &parent);
        wait_for(&handle, |s| s.state == SupervisorState::Streaming).await;

        parent.cancel();
        wait_for(&handle, |s| s.state == SupervisorState::Stopped).await;
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_backoff() {
        let session = FakeSession::new(vec![Script::Refuse]);
        let handle = Supervisor::spawn(
            Arc::clone(&session),
            BackoffPolicy::Fixed {
                delay: Duration::from_secs(3600),
            },
            &CancellationToken::new(),
        );
        wait_for(&handle, |s| s.state == SupervisorState::Backoff).await;
        assert!(handle.is_running());
        handle.stop().await;
        assert_eq!(session.connects.lock().unwrap().len(), 1);
    }
}
