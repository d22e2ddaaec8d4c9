// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

//! Bounded polling. Every `wait_for_*` helper in the crate goes through one of these two
//! functions so that no loop can spin without a deadline.

use std::{future::Future, time::Duration};

use tokio::time::{sleep, Instant};

use crate::error::Result;

/// The default tick between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Poll `predicate` every `interval` until it returns true or `timeout` has elapsed.
///
/// The predicate is always evaluated at least once, and once more at the deadline. Returns whether
/// the predicate was observed to hold.
pub async fn wait_until<F, Fut>(timeout: Duration, interval: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Like [`wait_until`], for predicates that can fail. The first error ends the wait and is
/// returned.
pub async fn try_wait_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut predicate: F,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::Error;

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_predicate_holds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let ok = wait_until(Duration::from_secs(10), Duration::from_secs(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst) >= 2
        })
        .await;
        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_deadline() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let start = Instant::now();
        let ok = wait_until(Duration::from_secs(5), Duration::from_secs(2), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            false
        })
        .await;
        assert!(!ok);
        // t=0, 2, 4, 5
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_end_the_wait() {
        let res = try_wait_until(Duration::from_secs(5), Duration::from_secs(1), || async {
            Err(Error::transport("server1", "unreachable"))
        })
        .await;
        assert!(matches!(res, Err(Error::Transport { .. })));
    }
}
