//! Background prefetch of artwork around the focused item.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, trace, warn};

use crate::application::services::{CandidateResolver, outcome};
use crate::domain::entities::{CatalogItem, PresentationContext};
use crate::domain::errors::FetchOutcome;

use super::fetch_pool::FetchPool;
use super::memory_cache::ImageCache;

/// Default number of items prefetched on each side of the focus.
pub const DEFAULT_PREFETCH_DISTANCE: usize = 2;

/// Default number of prefetch jobs running at once.
pub const DEFAULT_PREFETCH_WORKERS: usize = 4;

/// Configuration for the prefetch scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Items on each side of the focus to prefetch.
    pub distance: usize,
    /// Concurrent prefetch jobs.
    pub workers: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            distance: DEFAULT_PREFETCH_DISTANCE,
            workers: DEFAULT_PREFETCH_WORKERS,
        }
    }
}

/// Indices within `distance` of `index`, clipped to `0..len`, nearest first.
/// The focused index itself is never included.
#[must_use]
pub fn prefetch_window(index: usize, len: usize, distance: usize) -> Vec<usize> {
    let mut window = Vec::with_capacity(distance * 2);
    for offset in 1..=distance {
        if let Some(before) = index.checked_sub(offset)
            && before < len
        {
            window.push(before);
        }
        if let Some(after) = index.checked_add(offset)
            && after < len
        {
            window.push(after);
        }
    }
    window
}

#[derive(Debug, Clone)]
struct PrefetchJob {
    item_id: String,
    url: String,
}

#[derive(Debug)]
enum PrefetchCommand {
    Window { jobs: Vec<PrefetchJob> },
    CancelPending,
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct PrefetchCounters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
}

/// Prefetch activity since the scheduler started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Jobs queued for fetching.
    pub scheduled: u64,
    /// Jobs whose image ended up cached.
    pub completed: u64,
    /// Jobs that failed; never reported to the renderer.
    pub failed: u64,
    /// Window entries ignored because they were cached, in flight or already visited.
    pub skipped: u64,
    /// Queued jobs discarded before starting.
    pub dropped: u64,
}

impl PrefetchStats {
    /// Jobs queued or running.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.scheduled
            .saturating_sub(self.completed + self.failed + self.dropped)
    }
}

impl std::fmt::Display for PrefetchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Prefetch: {} scheduled, {} completed, {} failed, {} skipped, {} dropped",
            self.scheduled, self.completed, self.failed, self.skipped, self.dropped
        )
    }
}

/// Schedules bounded background fetches for items near the focus.
///
/// Owns a worker task that is shut down when the scheduler is dropped.
pub struct PrefetchScheduler {
    config: PrefetchConfig,
    resolver: CandidateResolver,
    context: Option<PresentationContext>,
    commands: mpsc::UnboundedSender<PrefetchCommand>,
    counters: Arc<PrefetchCounters>,
}

/// State for the background worker loop.
struct WorkerState {
    cache: Arc<ImageCache>,
    pool: FetchPool,
    permits: Arc<Semaphore>,
    counters: Arc<PrefetchCounters>,
    commands: mpsc::UnboundedReceiver<PrefetchCommand>,
    queue: VecDeque<PrefetchJob>,
    visited: HashSet<String>,
    tasks: JoinSet<(PrefetchJob, FetchOutcome)>,
    flush_waiters: Vec<oneshot::Sender<()>>,
}

impl PrefetchScheduler {
    /// Creates the scheduler and spawns its worker. Must be called within a
    /// Tokio runtime.
    #[must_use]
    pub fn new(
        config: PrefetchConfig,
        resolver: CandidateResolver,
        cache: Arc<ImageCache>,
        pool: FetchPool,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(PrefetchCounters::default());

        let worker_state =
            WorkerState::new(cache, pool, config.workers, counters.clone(), command_rx);

        tokio::spawn(Self::run_worker_loop(worker_state));

        Self {
            config,
            resolver,
            context: None,
            commands,
            counters,
        }
    }

    /// Uses `context` for every item instead of inferring it from the item kind.
    #[must_use]
    pub const fn with_context(mut self, context: PresentationContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Window distance and worker count.
    #[must_use]
    pub const fn config(&self) -> PrefetchConfig {
        self.config
    }

    /// Reports a focus change. Queued jobs outside the new window are
    /// dropped; running ones finish into the cache.
    pub fn on_focus_changed(&self, index: usize, items: &[CatalogItem]) {
        let jobs: Vec<PrefetchJob> = prefetch_window(index, items.len(), self.config.distance)
            .into_iter()
            .filter_map(|i| items.get(i))
            .filter_map(|item| {
                let context = self
                    .context
                    .unwrap_or_else(|| PresentationContext::for_kind(item.kind()));
                let Some(descriptor) = self.resolver.primary(item, context) else {
                    trace!(item_id = item.id(), %context, "No image to prefetch");
                    return None;
                };
                Some(PrefetchJob {
                    item_id: item.id().to_string(),
                    url: descriptor.url().to_string(),
                })
            })
            .collect();

        trace!(index, jobs = jobs.len(), "Focus changed");
        self.send(PrefetchCommand::Window { jobs });
    }

    /// Drops every queued job. Running jobs are left to finish.
    pub fn cancel_pending(&self) {
        self.send(PrefetchCommand::CancelPending);
    }

    /// Waits until no job is queued or running.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(PrefetchCommand::Flush(tx)) {
            let _ = rx.await;
        }
    }

    /// Counters since the scheduler started.
    #[must_use]
    pub fn stats(&self) -> PrefetchStats {
        let c = &self.counters;
        PrefetchStats {
            scheduled: c.scheduled.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            skipped: c.skipped.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    fn send(&self, command: PrefetchCommand) -> bool {
        if let Err(e) = self.commands.send(command) {
            error!("Prefetch worker is not running: {}", e);
            return false;
        }
        true
    }

    /// Worker loop that owns the queue, the visited set and the running jobs.
    async fn run_worker_loop(mut state: WorkerState) {
        loop {
            tokio::select! {
                cmd = state.commands.recv() => {
                    match cmd {
                        Some(PrefetchCommand::Window { jobs }) => state.replace_window(jobs),
                        Some(PrefetchCommand::CancelPending) => state.drop_queued(),
                        Some(PrefetchCommand::Flush(tx)) => state.flush_waiters.push(tx),
                        None => break,
                    }
                }
                Ok(permit) = state.permits.clone().acquire_owned(), if !state.queue.is_empty() => {
                    state.start_next(permit);
                }
                Some(joined) = state.tasks.join_next(), if !state.tasks.is_empty() => {
                    state.record(joined);
                }
            }

            if state.queue.is_empty() && state.tasks.is_empty() {
                for tx in state.flush_waiters.drain(..) {
                    let _ = tx.send(());
                }
            }
        }

        debug!(running = state.tasks.len(), "Prefetch worker stopped");
    }
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("config", &self.config)
            .field("context", &self.context)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl WorkerState {
    fn new(
        cache: Arc<ImageCache>,
        pool: FetchPool,
        workers: usize,
        counters: Arc<PrefetchCounters>,
        commands: mpsc::UnboundedReceiver<PrefetchCommand>,
    ) -> Self {
        Self {
            cache,
            pool,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            counters,
            commands,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            tasks: JoinSet::new(),
            flush_waiters: Vec::new(),
        }
    }

    /// Queues the new window. The visited set is cut down to the window, so it
    /// never holds more than one window's URLs; running and cached URLs are
    /// still skipped through `contains` and `is_in_flight`.
    fn replace_window(&mut self, jobs: Vec<PrefetchJob>) {
        {
            let wanted: HashSet<&str> = jobs.iter().map(|job| job.url.as_str()).collect();
            let before = self.queue.len();
            self.queue.retain(|job| wanted.contains(job.url.as_str()));
            self.visited.retain(|url| wanted.contains(url.as_str()));
            let dropped = before - self.queue.len();
            if dropped > 0 {
                self.counters
                    .dropped
                    .fetch_add(dropped as u64, Ordering::Relaxed);
                debug!(dropped, "Dropped prefetch jobs outside the window");
            }
        }

        for job in jobs {
            if self.visited.contains(&job.url)
                || self.cache.contains(&job.url)
                || self.cache.is_in_flight(&job.url)
            {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                trace!(item_id = %job.item_id, "Prefetch skipped");
                continue;
            }
            self.visited.insert(job.url.clone());
            self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
            self.queue.push_back(job);
        }
    }

    fn drop_queued(&mut self) {
        let dropped = self.queue.len();
        for job in self.queue.drain(..) {
            self.visited.remove(&job.url);
        }
        self.counters
            .dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
        debug!(dropped, "Cancelled pending prefetch jobs");
    }

    fn start_next(&mut self, permit: OwnedSemaphorePermit) {
        let Some(job) = self.queue.pop_front() else {
            return;
        };

        let cache = Arc::clone(&self.cache);
        let fill = self.pool.fetch(&job.url);
        debug!(item_id = %job.item_id, url = %job.url, "Prefetching image");

        self.tasks.spawn(async move {
            let result = cache
                .get_or_fill(&job.url, fill)
                .await
                .map(|lease| lease.payload().clone());
            drop(permit);
            (job, outcome(result))
        });
    }

    fn record(&mut self, joined: Result<(PrefetchJob, FetchOutcome), JoinError>) {
        match joined {
            Ok((job, FetchOutcome::Success(_))) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                // Cached now; if it is evicted later it may be prefetched again.
                self.visited.remove(&job.url);
                trace!(item_id = %job.item_id, "Prefetched image");
            }
            Ok((job, FetchOutcome::Failure { kind, status })) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!(item_id = %job.item_id, url = %job.url, %kind, ?status, "Prefetch failed");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                if !e.is_cancelled() {
                    warn!(error = %e, "Prefetch task panicked");
                }
            }
        }
    }
}
