//! Periodic background sampling (§4.3): a registry of named
//! measurement loops, each sampling on a fixed cadence and folding
//! results into an accumulator until stopped.
//!
//! Grounded on the teacher's worker-thread bookkeeping pattern
//! (start/stop by key, reject re-registration, join and surface a
//! panic as an error) generalized from OS threads to tokio tasks, and
//! on `posix_implementation_handler.py`'s `_thread_loop` cadence.
//! Error surfacing on stop mirrors the original's `ExceptionThread`,
//! which re-raises whatever its target raised when joined.

pub mod delegated;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{HandlerError, SamplerError};

/// The cadence engine never samples faster than this, regardless of
/// what `start` is asked for — a zero or sub-millisecond interval
/// would otherwise busy-loop the worker against the transport.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// A fold step: combines a freshly drawn raw sample with whatever
/// buffers have accumulated so far, returning the updated pair. Two
/// shapes occur in practice:
/// - stateless parsing folds, which ignore `raw_buffer` entirely and
///   just parse+push onto `processed_buffer`;
/// - differencing folds (CPU usage), which keep the previous raw
///   sample in `raw_buffer` and only emit into `processed_buffer` once
///   there are two raw samples to diff.
pub trait Fold<Raw, Processed>: Send + Sync {
    fn step(
        &self,
        raw_sample: Raw,
        raw_buffer: Vec<Raw>,
        processed_buffer: Vec<Processed>,
    ) -> (Vec<Raw>, Vec<Processed>);
}

impl<Raw, Processed, F> Fold<Raw, Processed> for F
where
    F: Fn(Raw, Vec<Raw>, Vec<Processed>) -> (Vec<Raw>, Vec<Processed>) + Send + Sync,
{
    fn step(
        &self,
        raw_sample: Raw,
        raw_buffer: Vec<Raw>,
        processed_buffer: Vec<Processed>,
    ) -> (Vec<Raw>, Vec<Processed>) {
        self(raw_sample, raw_buffer, processed_buffer)
    }
}

/// What the worker task hands back when it exits, whether by a stop
/// signal or because `draw` failed.
type LoopResult<Raw, Processed> = Result<(Vec<Raw>, Vec<Processed>), HandlerError>;

struct RunningLoop<Raw, Processed> {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<LoopResult<Raw, Processed>>,
}

/// Registry of running sampling loops, keyed by a caller-chosen kind
/// string (e.g. `"cpu"`, `"mem"`). One loop per kind may run at a
/// time; starting an already-running kind is rejected.
pub struct SamplerRegistry<Raw, Processed> {
    running: DashMap<String, Arc<Mutex<Option<RunningLoop<Raw, Processed>>>>>,
}

impl<Raw: Send + 'static, Processed: Send + 'static> Default for SamplerRegistry<Raw, Processed> {
    fn default() -> Self {
        Self { running: DashMap::new() }
    }
}

impl<Raw: Send + 'static, Processed: Send + 'static> SamplerRegistry<Raw, Processed> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts sampling under `kind`. `draw` produces one raw sample;
    /// `fold` combines it into the running buffers. The loop draws a
    /// sample immediately, then repeats on `interval`, tracking drift
    /// the way `posix_implementation_handler.py`'s `_thread_loop` does:
    /// `last_run += interval` (never `now()`, which would let the
    /// cadence slip under load), sleeping for at most
    /// `interval / 4` at a time so a stop request is never missed by
    /// more than a quarter period.
    ///
    /// If `draw` ever fails, the worker terminates immediately instead
    /// of skipping the tick; the error is surfaced from [`Self::stop`],
    /// never swallowed.
    pub async fn start<D, DFut, F>(
        &self,
        kind: impl Into<String>,
        interval: Duration,
        draw: D,
        fold: F,
    ) -> Result<(), SamplerError>
    where
        D: Fn() -> DFut + Send + Sync + 'static,
        DFut: std::future::Future<Output = Result<Raw, HandlerError>> + Send,
        F: Fold<Raw, Processed> + Send + Sync + 'static,
    {
        if interval < MIN_SAMPLE_INTERVAL {
            return Err(SamplerError::IntervalTooShort {
                given: interval,
                min: MIN_SAMPLE_INTERVAL,
            });
        }

        let kind = kind.into();
        let slot = self
            .running
            .entry(kind.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock().await;
        if guard.is_some() {
            return Err(SamplerError::AlreadyRunning(kind));
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let fold = Arc::new(fold);
        let loop_kind = kind.clone();

        let handle = tokio::spawn(async move {
            let mut raw_buffer: Vec<Raw> = Vec::new();
            let mut processed_buffer: Vec<Processed> = Vec::new();
            let quarter = interval / 4;

            loop {
                match draw().await {
                    Ok(sample) => {
                        let (nr, np) = fold.step(sample, raw_buffer, processed_buffer);
                        raw_buffer = nr;
                        processed_buffer = np;
                    }
                    Err(e) => {
                        warn!(kind = %loop_kind, error = %e, "sample draw failed, terminating sampler");
                        return Err(e);
                    }
                }

                let mut last_run = tokio::time::Instant::now();
                let deadline = last_run + interval;
                loop {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        last_run += interval;
                        break;
                    }
                    let remaining = deadline - now;
                    let sleep_for = remaining.min(quarter.max(Duration::from_millis(1)));
                    tokio::select! {
                        _ = &mut stop_rx => {
                            // The spec's stop sequence forces one more
                            // draw+fold when nothing has been emitted
                            // yet (e.g. a differencing fold stopped
                            // after only one tick), so the caller still
                            // gets something useful instead of an empty
                            // processed buffer.
                            if processed_buffer.is_empty() {
                                match draw().await {
                                    Ok(sample) => {
                                        let (nr, np) = fold.step(sample, raw_buffer, processed_buffer);
                                        raw_buffer = nr;
                                        processed_buffer = np;
                                    }
                                    Err(e) => {
                                        warn!(kind = %loop_kind, error = %e, "final draw on stop failed");
                                    }
                                }
                            }
                            return Ok((raw_buffer, processed_buffer));
                        }
                        _ = tokio::time::sleep(sleep_for) => continue,
                    }
                }
            }
        });

        *guard = Some(RunningLoop {
            stop_tx: Some(stop_tx),
            handle,
        });
        debug!(kind = %kind, interval_ms = interval.as_millis(), "sampler started");
        Ok(())
    }

    /// Stops the loop registered under `kind`, waits for it to exit,
    /// and returns `(raw_buffer, processed_buffer)`. If the worker
    /// terminated because `draw` failed, that error is surfaced as
    /// [`SamplerError::WorkerFailed`] rather than discarded; if the
    /// task itself panicked, as [`SamplerError::WorkerPanicked`].
    pub async fn stop(&self, kind: &str) -> Result<(Vec<Raw>, Vec<Processed>), SamplerError> {
        let Some(slot) = self.running.get(kind).map(|s| s.clone()) else {
            return Err(SamplerError::NotRunning(kind.to_string()));
        };
        let mut guard = slot.lock().await;
        let Some(mut running) = guard.take() else {
            return Err(SamplerError::NotRunning(kind.to_string()));
        };
        if let Some(tx) = running.stop_tx.take() {
            tx.send(()).ok();
        }
        let outcome = running
            .handle
            .await
            .map_err(|e| SamplerError::WorkerPanicked(e.to_string()))?;
        self.running.remove(kind);
        outcome.map_err(|source| SamplerError::WorkerFailed {
            kind: kind.to_string(),
            source: Box::new(source),
        })
    }

    pub fn is_running(&self, kind: &str) -> bool {
        self.running
            .get(kind)
            .map(|s| s.try_lock().map(|g| g.is_some()).unwrap_or(true))
            .unwrap_or(false)
    }
}

/// A fold that ignores the raw buffer entirely: every draw is parsed
/// independently and appended.
pub fn stateless_fold<Raw, Processed>(
    parse: impl Fn(&Raw) -> Processed + Send + Sync + 'static,
) -> impl Fold<Raw, Processed> {
    move |sample: Raw, raw_buffer: Vec<Raw>, mut processed_buffer: Vec<Processed>| {
        processed_buffer.push(parse(&sample));
        (raw_buffer, processed_buffer)
    }
}

/// A fold that diffs each new raw sample against the previous one
/// (CPU usage and similar counters): keeps exactly one raw sample
/// around, emitting a processed value only from the second draw on.
pub fn differencing_fold<Raw: Clone, Processed>(
    diff: impl Fn(&Raw, &Raw) -> Processed + Send + Sync + 'static,
) -> impl Fold<Raw, Processed> {
    move |sample: Raw, raw_buffer: Vec<Raw>, mut processed_buffer: Vec<Processed>| {
        if let Some(previous) = raw_buffer.last() {
            processed_buffer.push(diff(previous, &sample));
        }
        (vec![sample], processed_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn start_rejects_duplicate_kind() {
        let registry: SamplerRegistry<u32, u32> = SamplerRegistry::new();
        registry
            .start(
                "cpu",
                Duration::from_secs(1),
                || async { Ok::<u32, HandlerError>(1) },
                stateless_fold(|r: &u32| *r),
            )
            .await
            .unwrap();

        let err = registry
            .start(
                "cpu",
                Duration::from_secs(1),
                || async { Ok::<u32, HandlerError>(1) },
                stateless_fold(|r: &u32| *r),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SamplerError::AlreadyRunning(_)));

        registry.stop("cpu").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejects_zero_interval() {
        let registry: SamplerRegistry<u32, u32> = SamplerRegistry::new();
        let err = registry
            .start(
                "cpu",
                Duration::ZERO,
                || async { Ok::<u32, HandlerError>(1) },
                stateless_fold(|r: &u32| *r),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SamplerError::IntervalTooShort { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_returns_accumulated_samples() {
        let registry: SamplerRegistry<u32, u32> = SamplerRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        registry
            .start(
                "mem",
                Duration::from_millis(100),
                move || {
                    let counter = counter_clone.clone();
                    async move { Ok::<u32, HandlerError>(counter.fetch_add(1, Ordering::SeqCst)) }
                },
                stateless_fold(|r: &u32| *r),
            )
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        let (_raw, processed) = registry.stop("mem").await.unwrap();
        assert!(processed.len() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_forces_a_final_draw_when_nothing_was_emitted_yet() {
        // A differencing fold needs two raw samples before it emits
        // anything; stopping right after the first tick must still
        // produce one processed value via the forced extra draw.
        let registry: SamplerRegistry<u32, u32> = SamplerRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        registry
            .start(
                "cpu",
                Duration::from_secs(10),
                move || {
                    let counter = counter_clone.clone();
                    async move { Ok::<u32, HandlerError>(counter.fetch_add(1, Ordering::SeqCst)) }
                },
                differencing_fold(|prev: &u32, curr: &u32| curr - prev),
            )
            .await
            .unwrap();

        tokio::task::yield_now().await;
        let (_raw, processed) = registry.stop("cpu").await.unwrap();
        assert_eq!(processed, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_surfaces_the_draw_error_instead_of_swallowing_it() {
        let registry: SamplerRegistry<u32, u32> = SamplerRegistry::new();
        registry
            .start(
                "cpu",
                Duration::from_secs(1),
                || async { Err::<u32, HandlerError>(HandlerError::Other("boom".into())) },
                stateless_fold(|r: &u32| *r),
            )
            .await
            .unwrap();

        tokio::task::yield_now().await;
        let err = registry.stop("cpu").await.unwrap_err();
        match err {
            SamplerError::WorkerFailed { kind, source } => {
                assert_eq!(kind, "cpu");
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("expected WorkerFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_unknown_kind_errors() {
        let registry: SamplerRegistry<u32, u32> = SamplerRegistry::new();
        let err = registry.stop("ghost").await.unwrap_err();
        assert!(matches!(err, SamplerError::NotRunning(_)));
    }
}
