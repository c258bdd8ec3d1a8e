//! The reload coordinator owns the current epoch and the set of
//! pending long-polls. No other component completes a pending poll.

use std::sync::Mutex;

use rand::Rng;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::runner::RunOutcome;

/// Body of a poll response. `epoch` and `reload` are the load-bearing
/// fields; the rest give the client something to show on failure.
#[derive(Debug, Clone, Serialize)]
pub struct PollResponse {
    pub epoch: String,
    pub reload: bool,
    pub code: Option<i32>,
    pub output: Option<String>,
    pub command: Option<String>,
}

/// How a poll request is answered.
pub enum PollWait {
    /// Resolve immediately with the steady-state response.
    Ready(PollResponse),
    /// Long-poll: resolved by the next publish.
    Pending(oneshot::Receiver<PollResponse>),
}

struct Inner {
    /// Monotonic component of the epoch; guarantees no epoch is reused.
    counter: u64,
    epoch: String,
    last_outcome: Option<RunOutcome>,
    pending: Vec<oneshot::Sender<PollResponse>>,
}

/// Owns the current epoch, the pending-poll set and the last run outcome.
pub struct Coordinator {
    command: Option<String>,
    inner: Mutex<Inner>,
}

impl Coordinator {
    /// Create a coordinator with a freshly minted starting epoch.
    pub fn new(command: Option<String>) -> Self {
        let mut counter = 0;
        let epoch = mint_epoch(&mut counter);
        Self {
            command,
            inner: Mutex::new(Inner {
                counter,
                epoch,
                last_outcome: None,
                pending: Vec::new(),
            }),
        }
    }

    /// The epoch embedded into injected pages.
    pub fn current_epoch(&self) -> String {
        self.inner.lock().expect("coordinator lock poisoned").epoch.clone()
    }

    /// Answer a poll request.
    ///
    /// An absent or stale epoch resolves immediately with the current
    /// state and `reload: false`; a poll carrying the current epoch is
    /// registered and held until the next publish.
    pub fn handle_poll(&self, supplied: Option<&str>) -> PollWait {
        let mut inner = self.inner.lock().expect("coordinator lock poisoned");

        match supplied {
            Some(epoch) if epoch == inner.epoch => {
                let (tx, rx) = oneshot::channel();
                inner.pending.push(tx);
                PollWait::Pending(rx)
            }
            _ => PollWait::Ready(self.steady_response(&inner)),
        }
    }

    /// Publish a completed rebuild: mint a new epoch, record the
    /// outcome, and resolve every pending long-poll exactly once.
    ///
    /// A failed command still advances the epoch but resolves with
    /// `reload: false`. Clients reconnecting afterward get the
    /// steady-state response and are never told to reload twice.
    pub fn publish(&self, outcome: RunOutcome) {
        let mut inner = self.inner.lock().expect("coordinator lock poisoned");

        let reload = outcome.success();
        if reload {
            tracing::info!("Reloading");
        } else {
            tracing::info!("Not reloading");
        }

        inner.epoch = mint_epoch(&mut inner.counter);

        let response = PollResponse {
            epoch: inner.epoch.clone(),
            reload,
            code: outcome.code,
            output: Some(outcome.output.clone()),
            command: self.command.clone(),
        };
        inner.last_outcome = Some(outcome);

        for tx in inner.pending.drain(..) {
            // A receiver dropped mid-poll (client went away) is fine.
            let _ = tx.send(response.clone());
        }
    }

    fn steady_response(&self, inner: &Inner) -> PollResponse {
        PollResponse {
            epoch: inner.epoch.clone(),
            reload: false,
            code: inner.last_outcome.as_ref().and_then(|o| o.code),
            output: inner.last_outcome.as_ref().map(|o| o.output.clone()),
            command: self.command.clone(),
        }
    }
}

/// Mint a fresh epoch token: a monotonic counter mixed with a random
/// component. The counter makes reuse impossible; the random part keeps
/// the value unguessable across restarts.
fn mint_epoch(counter: &mut u64) -> String {
    *counter += 1;
    let token: u32 = rand::thread_rng().gen_range(1..=1_000_000_000);
    format!("{}-{}", counter, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_outcome() -> RunOutcome {
        RunOutcome {
            code: Some(0),
            signal: None,
            output: "built".into(),
        }
    }

    fn failed_outcome() -> RunOutcome {
        RunOutcome {
            code: Some(1),
            signal: None,
            output: "error: b0rk".into(),
        }
    }

    #[test]
    fn test_epochs_never_reused() {
        let coordinator = Coordinator::new(None);
        let mut seen = std::collections::HashSet::new();
        seen.insert(coordinator.current_epoch());
        for _ in 0..200 {
            coordinator.publish(ok_outcome());
            assert!(
                seen.insert(coordinator.current_epoch()),
                "epoch reused by a later publish"
            );
        }
    }

    #[test]
    fn test_absent_epoch_resolves_immediately() {
        let coordinator = Coordinator::new(None);
        match coordinator.handle_poll(None) {
            PollWait::Ready(resp) => {
                assert_eq!(resp.epoch, coordinator.current_epoch());
                assert!(!resp.reload);
            }
            PollWait::Pending(_) => panic!("absent epoch must not long-poll"),
        }
    }

    #[test]
    fn test_stale_epoch_resolves_immediately() {
        let coordinator = Coordinator::new(None);
        match coordinator.handle_poll(Some("not-the-current-epoch")) {
            PollWait::Ready(resp) => assert!(!resp.reload),
            PollWait::Pending(_) => panic!("stale epoch must not long-poll"),
        }
    }

    #[tokio::test]
    async fn test_current_epoch_held_until_publish() {
        let coordinator = Coordinator::new(None);
        let epoch = coordinator.current_epoch();

        let PollWait::Pending(mut rx) = coordinator.handle_poll(Some(&epoch)) else {
            panic!("current epoch must long-poll");
        };
        assert!(rx.try_recv().is_err(), "resolved before publish");

        coordinator.publish(ok_outcome());
        let resp = rx.await.expect("resolved by publish");
        assert!(resp.reload);
        assert_ne!(resp.epoch, epoch);
        assert_eq!(resp.epoch, coordinator.current_epoch());
    }

    #[tokio::test]
    async fn test_failed_command_advances_epoch_without_reload() {
        let coordinator = Coordinator::new(Some("make".into()));
        let epoch = coordinator.current_epoch();

        let PollWait::Pending(rx) = coordinator.handle_poll(Some(&epoch)) else {
            panic!("current epoch must long-poll");
        };

        coordinator.publish(failed_outcome());
        let resp = rx.await.unwrap();
        assert!(!resp.reload);
        assert_ne!(resp.epoch, epoch);
        assert_eq!(resp.code, Some(1));
        assert_eq!(resp.command.as_deref(), Some("make"));
    }

    #[tokio::test]
    async fn test_publish_resolves_all_pending_and_clears() {
        let coordinator = Coordinator::new(None);
        let epoch = coordinator.current_epoch();

        let mut receivers = Vec::new();
        for _ in 0..5 {
            match coordinator.handle_poll(Some(&epoch)) {
                PollWait::Pending(rx) => receivers.push(rx),
                PollWait::Ready(_) => panic!("current epoch must long-poll"),
            }
        }

        coordinator.publish(ok_outcome());
        for rx in receivers {
            assert!(rx.await.unwrap().reload);
        }

        // A second publish has no one left to resolve; new polls with the
        // fresh epoch block until a further publish.
        let fresh = coordinator.current_epoch();
        assert!(matches!(
            coordinator.handle_poll(Some(&fresh)),
            PollWait::Pending(_)
        ));
    }

    #[tokio::test]
    async fn test_end_to_end_epoch_protocol() {
        let coordinator = Coordinator::new(None);

        // New client learns the current epoch without being told to reload.
        let PollWait::Ready(first) = coordinator.handle_poll(None) else {
            panic!("no-epoch poll must resolve immediately");
        };
        assert!(!first.reload);

        // Client waits on the epoch it was given.
        let PollWait::Pending(rx) = coordinator.handle_poll(Some(&first.epoch)) else {
            panic!("fresh epoch must long-poll");
        };

        // A change lands and the rebuild passes.
        coordinator.publish(ok_outcome());
        let second = rx.await.unwrap();
        assert!(second.reload);
        assert_ne!(second.epoch, first.epoch);

        // The reloaded client's next poll blocks again.
        assert!(matches!(
            coordinator.handle_poll(Some(&second.epoch)),
            PollWait::Pending(_)
        ));
    }
}
