//! Bounded-concurrency batch dispatch.
//!
//! [`BatchProcessor`] fans a workload out over spawned tasks, bounded by a
//! counting semaphore, with a per-item deadline and an external cancellation
//! token. Results come back at the same index as their input regardless of
//! completion order, and every per-item failure stays visible at its slot.
//!
//! The module also carries the retry and chunking helpers rollout pipelines
//! lean on: [`retry_with_backoff`], [`parallel_map`], and [`chunked`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Concurrency bound used when a non-positive one is supplied.
pub const DEFAULT_BATCH_CONCURRENT: usize = 10;

/// Per-item deadline used when a zero duration is supplied.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Batch processor
// ---------------------------------------------------------------------------

/// Concurrent map over a batch of items with one result slot per input.
///
/// Each item runs in its own spawned task. The semaphore caps how many run
/// at once; the deadline applies per item, so a slow item fails alone
/// without stalling its siblings. Cancelling the token preempts both the
/// semaphore wait and in-flight work.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    max_concurrent: usize,
    item_timeout: Duration,
}

impl BatchProcessor {
    /// Create a processor. A zero `max_concurrent` falls back to
    /// [`DEFAULT_BATCH_CONCURRENT`], a zero `item_timeout` to
    /// [`DEFAULT_ITEM_TIMEOUT`].
    pub fn new(max_concurrent: usize, item_timeout: Duration) -> Self {
        Self {
            max_concurrent: if max_concurrent == 0 {
                DEFAULT_BATCH_CONCURRENT
            } else {
                max_concurrent
            },
            item_timeout: if item_timeout.is_zero() {
                DEFAULT_ITEM_TIMEOUT
            } else {
                item_timeout
            },
        }
    }

    /// Process every item, returning one `Result` per input index.
    pub async fn process<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        process_item: F,
    ) -> Vec<Result<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.process_with_progress(items, cancel, |_, _| {}, process_item)
            .await
    }

    /// Like [`BatchProcessor::process`], invoking `on_progress(completed,
    /// total)` exactly once per finished item, success or failure. The
    /// callback runs under a lock so the completed count never goes
    /// backwards.
    pub async fn process_with_progress<T, R, F, Fut, P>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        on_progress: P,
        process_item: F,
    ) -> Vec<Result<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        P: Fn(usize, usize) + Send + Sync + 'static,
    {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let completed = Arc::new(Mutex::new(0usize));
        let on_progress = Arc::new(on_progress);
        let item_timeout = self.item_timeout;

        let mut handles = Vec::with_capacity(total);
        for (idx, item) in items.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            let on_progress = Arc::clone(&on_progress);
            let cancel = cancel.clone();
            let process_item = process_item.clone();

            handles.push(tokio::spawn(async move {
                let result = run_item(
                    idx,
                    item,
                    item_timeout,
                    &semaphore,
                    &cancel,
                    process_item,
                )
                .await;

                let mut done = completed.lock().await;
                *done += 1;
                on_progress(*done, total);
                debug!(item = idx, completed = *done, total, ok = result.is_ok(), "batch item finished");

                result
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            results.push(
                handle
                    .await
                    .unwrap_or_else(|err| Err(anyhow!("batch worker panicked: {err}"))),
            );
        }
        results
    }

    /// All-or-nothing wrapper: any per-item failure collapses the whole
    /// batch into one error naming the first failing index.
    pub async fn process_all<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        process_item: F,
    ) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(usize, T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let results = self.process(items, cancel, process_item).await;
        let mut values = Vec::with_capacity(results.len());
        for (idx, result) in results.into_iter().enumerate() {
            values.push(result.with_context(|| format!("batch item {idx} failed"))?);
        }
        Ok(values)
    }
}

/// One worker body: wait for cancellation or a permit, then for cancellation
/// or the (deadlined) item future.
async fn run_item<T, R, F, Fut>(
    idx: usize,
    item: T,
    item_timeout: Duration,
    semaphore: &Semaphore,
    cancel: &CancellationToken,
    process_item: F,
) -> Result<R>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            anyhow::bail!("batch canceled before item {idx} was dispatched")
        }
        permit = semaphore.acquire() => permit.context("batch semaphore closed")?,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            anyhow::bail!("batch canceled while item {idx} was in flight")
        }
        outcome = tokio::time::timeout(item_timeout, process_item(idx, item)) => {
            match outcome {
                Ok(result) => result,
                Err(_) => anyhow::bail!(
                    "item {idx} timed out after {}ms",
                    item_timeout.as_millis()
                ),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Concurrent map with default per-item deadline and no external
/// cancellation; fails on the first failing item.
pub async fn parallel_map<T, R, F, Fut>(
    items: Vec<T>,
    max_concurrent: usize,
    process_item: F,
) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    BatchProcessor::new(max_concurrent, Duration::ZERO)
        .process_all(items, &CancellationToken::new(), process_item)
        .await
}

/// Retry an operation with exponential backoff: `initial_delay` doubles
/// after every failed attempt, up to `max_retries` retries. Cancellation is
/// honored between attempts; an exhausted budget reports the last error.
pub async fn retry_with_backoff<R, F, Fut>(
    max_retries: usize,
    initial_delay: Duration,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let mut delay = if initial_delay.is_zero() {
        Duration::from_millis(500)
    } else {
        initial_delay
    };

    let mut last_error = None;
    for attempt in 0..=max_retries {
        if cancel.is_cancelled() {
            anyhow::bail!("retry canceled after {attempt} attempts");
        }
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(attempt, error = %err, "retry attempt failed");
                last_error = Some(err);
            }
        }
        if attempt < max_retries {
            tokio::select! {
                _ = cancel.cancelled() => {
                    anyhow::bail!("retry canceled during backoff after {} attempts", attempt + 1)
                }
                _ = tokio::time::sleep(delay) => {}
            }
            delay *= 2;
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow!("operation never ran"))
        .context(format!("failed after {max_retries} retries")))
}

/// Split a slice into chunks of at most `chunk_size` items (minimum 1).
pub fn chunked<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    items
        .chunks(chunk_size.max(1))
        .map(<[T]>::to_vec)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_one_failure_stays_at_its_index() {
        let processor = BatchProcessor::new(2, Duration::from_secs(5));
        let items = vec![0usize, 1, 2, 3];

        let results = processor
            .process(items, &CancellationToken::new(), |_, item| async move {
                if item == 2 {
                    anyhow::bail!("item {item} exploded");
                }
                Ok(item * 10)
            })
            .await;

        assert_eq!(results.len(), 4);
        assert_eq!(*results[0].as_ref().unwrap(), 0);
        assert_eq!(*results[1].as_ref().unwrap(), 10);
        assert!(results[2].as_ref().unwrap_err().to_string().contains("exploded"));
        assert_eq!(*results[3].as_ref().unwrap(), 30);
    }

    #[tokio::test]
    async fn test_output_order_matches_input_order() {
        // Later items finish first; slots must still line up.
        let processor = BatchProcessor::new(4, Duration::from_secs(5));
        let items = vec![0usize, 1, 2, 3];

        let results = processor
            .process(items, &CancellationToken::new(), |idx, item| async move {
                tokio::time::sleep(Duration::from_millis(40 - 10 * idx as u64)).await;
                Ok(item)
            })
            .await;

        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_semaphore_caps_concurrency() {
        let processor = BatchProcessor::new(2, Duration::from_secs(5));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let in_flight_ref = Arc::clone(&in_flight);
        let peak_ref = Arc::clone(&peak);
        let results = processor
            .process(
                vec![(); 8],
                &CancellationToken::new(),
                move |_, ()| {
                    let in_flight = Arc::clone(&in_flight_ref);
                    let peak = Arc::clone(&peak_ref);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
            .await;

        assert!(results.iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_slow_item_times_out_alone() {
        let processor = BatchProcessor::new(2, Duration::from_millis(50));

        let results = processor
            .process(vec![0usize, 1], &CancellationToken::new(), |_, item| async move {
                if item == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                Ok(item)
            })
            .await;

        assert!(results[0].as_ref().unwrap_err().to_string().contains("timed out"));
        assert_eq!(*results[1].as_ref().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_preempts_pending_items() {
        let processor = BatchProcessor::new(1, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = processor
            .process(vec![0usize, 1], &cancel, |_, item| async move { Ok(item) })
            .await;

        for result in results {
            assert!(result.unwrap_err().to_string().contains("canceled"));
        }
    }

    #[tokio::test]
    async fn test_progress_fires_once_per_item() {
        let processor = BatchProcessor::new(2, Duration::from_millis(50));
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));

        let calls_ref = Arc::clone(&calls);
        let results = processor
            .process_with_progress(
                vec![0usize, 1, 2, 3],
                &CancellationToken::new(),
                move |done, total| calls_ref.lock().unwrap().push((done, total)),
                |_, item| async move {
                    // Item 3 fails, item 1 times out; both still count.
                    if item == 1 {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    if item == 3 {
                        anyhow::bail!("bad item");
                    }
                    Ok(item)
                },
            )
            .await;

        assert_eq!(results.len(), 4);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let counts: Vec<usize> = calls.iter().map(|(done, _)| *done).collect();
        assert_eq!(counts, vec![1, 2, 3, 4]);
        assert!(calls.iter().all(|(_, total)| *total == 4));
    }

    #[tokio::test]
    async fn test_process_all_names_first_failing_index() {
        let processor = BatchProcessor::new(4, Duration::from_secs(5));

        let err = processor
            .process_all(vec![0usize, 1, 2], &CancellationToken::new(), |_, item| async move {
                if item >= 1 {
                    anyhow::bail!("nope");
                }
                Ok(item)
            })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("batch item 1 failed"));
    }

    #[tokio::test]
    async fn test_parallel_map_collects_everything() {
        let doubled = parallel_map(vec![1usize, 2, 3], 2, |_, item| async move { Ok(item * 2) })
            .await
            .unwrap();
        assert_eq!(doubled, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_ref = Arc::clone(&attempts);

        let value = retry_with_backoff(
            5,
            Duration::from_millis(1),
            &CancellationToken::new(),
            move || {
                let attempts = Arc::clone(&attempts_ref);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("transient");
                    }
                    Ok(42)
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_reports_exhausted_budget() {
        let err = retry_with_backoff(
            2,
            Duration::from_millis(1),
            &CancellationToken::new(),
            || async { Err::<(), _>(anyhow!("always down")) },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("failed after 2 retries"));
        assert!(format!("{err:#}").contains("always down"));
    }

    #[tokio::test]
    async fn test_retry_stops_on_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = retry_with_backoff(3, Duration::from_millis(1), &cancel, || async {
            Ok::<_, anyhow::Error>(1)
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("canceled"));
    }

    #[test]
    fn test_chunked_splits_evenly_and_raggedly() {
        let chunks = chunked(&[1, 2, 3, 4, 5], 2);
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);

        // Zero is clamped to one-item chunks.
        assert_eq!(chunked(&[1, 2], 0).len(), 2);
        assert!(chunked::<i32>(&[], 3).is_empty());
    }
}
