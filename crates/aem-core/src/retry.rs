//! Bounded polling used by blocking waits.

use std::{future::Future, time::Duration};

use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};

#[derive(Error, Debug)]
pub enum RetryError<E> {
    #[error("maxRetries ({0}) should be > 0")]
    InvalidMaxRetries(u32),
    /// The predicate never reported success within the attempt budget.
    #[error("additional failures after {attempts} retries")]
    Exhausted { attempts: u32 },
    /// The predicate returned an error; no further attempts were made.
    #[error("{0}")]
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Polls `f` every `period` until it reports `Ok(true)`, up to `max_retries` calls.
///
/// The first call happens immediately. Ticks are wall-clock based: if `f`
/// takes one second of a three second period, the next call follows two
/// seconds later; a call slower than the period delays the next one.
/// `Ok(false)` means "not yet", any `Err` aborts at once.
pub async fn retry<F, Fut, E>(period: Duration, max_retries: u32, mut f: F) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    if max_retries == 0 {
        return Err(RetryError::InvalidMaxRetries(max_retries));
    }
    let mut tick = interval(period.max(Duration::from_millis(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately.
    tick.tick().await;

    for attempt in 1..=max_retries {
        if f().await.map_err(RetryError::Aborted)? {
            return Ok(());
        }
        if attempt == max_retries {
            break;
        }
        tick.tick().await;
    }
    Err(RetryError::Exhausted {
        attempts: max_retries,
    })
}
