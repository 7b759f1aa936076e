//! Global ceiling on in-flight external calls

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::ResearchError;

/// Admission gate shared by every branch of one run.
///
/// Each search or generation call holds one permit while it runs; excess
/// calls wait in FIFO order. Waiting and running both abort with
/// [`ResearchError::Cancelled`] once the run's token fires.
#[derive(Debug, Clone)]
pub struct ApiGate {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ApiGate {
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
            cancel,
        }
    }

    /// Run `call` under a permit, racing it against cancellation
    pub async fn call<T, F>(&self, call: F) -> Result<T, ResearchError>
    where
        F: Future<Output = Result<T, ResearchError>>,
    {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ResearchError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| ResearchError::Cancelled)?,
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ResearchError::Cancelled),
            result = call => result,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_ceiling_is_respected() {
        let gate = ApiGate::new(2, CancellationToken::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let calls = (0..8).map(|i| {
            let gate = gate.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                gate.call(async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ResearchError>(i)
                })
                .await
            }
        });

        let results = futures::future::join_all(calls).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(gate.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_call() {
        let token = CancellationToken::new();
        let gate = ApiGate::new(1, token.clone());

        let slow = gate.call(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ResearchError>(())
        });
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        };

        let (result, _) = tokio::join!(slow, canceller);
        assert_eq!(result, Err(ResearchError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_gate_rejects_new_calls() {
        let token = CancellationToken::new();
        token.cancel();
        let gate = ApiGate::new(1, token);
        let result = gate.call(async { Ok::<_, ResearchError>(1) }).await;
        assert_eq!(result, Err(ResearchError::Cancelled));
        assert!(gate.is_cancelled());
    }
}
