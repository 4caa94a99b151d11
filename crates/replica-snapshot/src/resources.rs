//! One-shot resource waits.
//!
//! Every suspension point during capture is the same race: the first of a
//! load/error event or a timeout, resolved once.

use std::time::Duration;

use smol::{Timer, future};

use crate::host::{LoadOutcome, Readiness};

/// Wait for `readiness` to settle, at most `timeout`.
///
/// `None` means the timeout won (or the host dropped the listener). An
/// already-settled resource still resolves on a later turn.
pub async fn wait_once(readiness: Readiness, timeout: Duration) -> Option<LoadOutcome> {
    match readiness {
        Readiness::Settled(outcome) => {
            future::yield_now().await;
            Some(outcome)
        }
        Readiness::Pending(receiver) => {
            future::or(async { receiver.recv().await.ok() }, async {
                let _ = Timer::after(timeout).await;
                None
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_resolves() {
        let outcome = smol::block_on(wait_once(
            Readiness::Settled(LoadOutcome::Failed),
            Duration::from_secs(5),
        ));
        assert_eq!(outcome, Some(LoadOutcome::Failed));
    }

    #[test]
    fn test_event_beats_timeout() {
        let (sender, receiver) = smol::channel::bounded(1);
        sender.try_send(LoadOutcome::Loaded).unwrap();
        let outcome = smol::block_on(wait_once(
            Readiness::Pending(receiver),
            Duration::from_secs(5),
        ));
        assert_eq!(outcome, Some(LoadOutcome::Loaded));
    }

    #[test]
    fn test_timeout_wins() {
        let (_sender, receiver) = smol::channel::bounded::<LoadOutcome>(1);
        let outcome = smol::block_on(wait_once(
            Readiness::Pending(receiver),
            Duration::from_millis(10),
        ));
        assert_eq!(outcome, None);
    }
}
