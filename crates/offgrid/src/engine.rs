//! A fixed pool of search threads sharing one [`SearchContext`].
//!
//! Queries are queued as tasks and served by the first free thread.
//! Settings changes are broadcasts: every thread applies each of them to
//! its own [`Processor`] before picking up its next task.

use std::{
    collections::VecDeque,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::{
    cancel::CancelToken,
    config::SearchConfig,
    context::SearchContext,
    error::{OffgridError, Result},
    params::SearchParams,
    processor::Processor,
    ranking::{EndMarker, Results},
};

type Callback = Box<dyn FnMut(&Results) + Send>;

/// A settings change applied by every search thread.
#[derive(Debug, Clone)]
pub enum Broadcast {
    SetLocale(String),
    ClearCaches,
    SetConfig(SearchConfig),
}

struct Task {
    params: SearchParams,
    cancel: CancelToken,
    callback: Option<Callback>,
    slot: Arc<ResultSlot>,
}

enum Message {
    Task(Task),
    Broadcast(Broadcast),
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    /// Broadcasts not yet applied, per thread.
    broadcasts: Vec<VecDeque<Broadcast>>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

impl Shared {
    /// Blocks until thread `worker` has something to do. Broadcasts come
    /// before tasks; `None` means shut down.
    fn next(&self, worker: usize) -> Option<Message> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(b) = queue.broadcasts[worker].pop_front() {
                return Some(Message::Broadcast(b));
            }
            if queue.shutdown {
                return None;
            }
            if let Some(task) = queue.tasks.pop_front() {
                return Some(Message::Task(task));
            }
            self.wakeup.wait(&mut queue);
        }
    }
}

#[derive(Default)]
struct ResultSlot {
    results: Mutex<Option<Results>>,
    ready: Condvar,
}

impl ResultSlot {
    fn set(&self, results: Results) {
        *self.results.lock() = Some(results);
        self.ready.notify_all();
    }
}

/// A running query.
pub struct QueryHandle {
    cancel: CancelToken,
    slot: Arc<ResultSlot>,
}

impl QueryHandle {
    /// Asks the query to stop. Results found so far are still delivered,
    /// with the `Cancelled` end marker.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.slot.results.lock().is_some()
    }

    /// Blocks until the query has ended and returns its final results.
    pub fn wait(self) -> Results {
        let mut results = self.slot.results.lock();
        loop {
            if let Some(results) = results.take() {
                return results;
            }
            self.slot.ready.wait(&mut results);
        }
    }
}

/// Thread pool front end of the search pipeline.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use offgrid::{Engine, SearchConfig, SearchContext, SearchParams};
/// use offgrid_data::{
///     geometry::{Point, rect_around},
///     test_data::TestWorld,
/// };
///
/// let ctx = Arc::new(SearchContext::try_from(TestWorld::sample()?)?);
/// let engine = Engine::new(ctx, SearchConfig::default())?;
/// let viewport = rect_around(Point::new(10.0, 50.0), 2_000.0);
/// let results = engine.search(SearchParams::new("main street 2", viewport))?.wait();
/// assert_eq!(results.items[0].address, "Main Street, 2, Springfield, Testland");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    /// Source of the timeout and soft deadline of new queries.
    config: Mutex<SearchConfig>,
}

impl Engine {
    #[instrument(name = "Start search engine", level = "info", skip_all, fields(threads = config.num_threads))]
    pub fn new(ctx: Arc<SearchContext>, config: SearchConfig) -> Result<Self> {
        let threads = config.num_threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                broadcasts: vec![VecDeque::new(); threads],
                ..Queue::default()
            }),
            wakeup: Condvar::new(),
        });

        let mut engine = Self {
            shared,
            workers: Vec::with_capacity(threads),
            config: Mutex::new(config.clone()),
        };
        for worker in 0..threads {
            let shared = engine.shared.clone();
            let processor = Processor::new(ctx.clone(), config.clone());
            let handle = thread::Builder::new()
                .name(format!("offgrid-search-{worker}"))
                .spawn(move || run_worker(worker, &shared, processor));
            match handle {
                Ok(handle) => engine.workers.push(handle),
                Err(e) => {
                    engine.shutdown();
                    return Err(e.into());
                }
            }
        }
        info!(threads, "Search engine started");
        Ok(engine)
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Queues a query.
    pub fn search(&self, params: SearchParams) -> Result<QueryHandle> {
        self.submit(params, None)
    }

    /// Queues a query whose intermediate and final results are also passed
    /// to `callback`, on the search thread.
    pub fn search_with_callback(
        &self,
        params: SearchParams,
        callback: impl FnMut(&Results) + Send + 'static,
    ) -> Result<QueryHandle> {
        self.submit(params, Some(Box::new(callback)))
    }

    /// The query's timeout starts when a search thread picks it up.
    fn submit(&self, params: SearchParams, callback: Option<Callback>) -> Result<QueryHandle> {
        let cancel = {
            let config = self.config.lock();
            CancelToken::pending(
                params.timeout.or(config.default_timeout),
                config.soft_deadline,
            )
        };
        let slot = Arc::new(ResultSlot::default());
        let task = Task {
            params,
            cancel: cancel.clone(),
            callback,
            slot: slot.clone(),
        };
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return Err(OffgridError::EngineShutDown);
            }
            queue.tasks.push_back(task);
        }
        self.shared.wakeup.notify_one();
        Ok(QueryHandle { cancel, slot })
    }

    fn broadcast(&self, message: Broadcast) -> Result<()> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return Err(OffgridError::EngineShutDown);
            }
            for pending in &mut queue.broadcasts {
                pending.push_back(message.clone());
            }
        }
        debug!(?message, "Broadcast queued");
        self.shared.wakeup.notify_all();
        Ok(())
    }

    /// Sets the locale used by queries that carry none.
    pub fn set_locale(&self, locale: impl Into<String>) -> Result<()> {
        self.broadcast(Broadcast::SetLocale(locale.into()))
    }

    pub fn clear_caches(&self) -> Result<()> {
        self.broadcast(Broadcast::ClearCaches)
    }

    /// Replaces the configuration of every search thread. The number of
    /// threads stays as it is.
    pub fn set_config(&self, config: SearchConfig) -> Result<()> {
        *self.config.lock() = config.clone();
        self.broadcast(Broadcast::SetConfig(config))
    }

    /// Stops the search threads. Queued queries that no thread picked up
    /// end as cancelled.
    pub fn shutdown(&mut self) {
        let pending: Vec<Task> = {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            queue.tasks.drain(..).collect()
        };
        self.shared.wakeup.notify_all();
        for task in pending {
            task.slot.set(cancelled());
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Search thread panicked");
            }
        }
        info!("Search engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn cancelled() -> Results {
    Results {
        end: Some(EndMarker::Cancelled),
        ..Results::default()
    }
}

fn run_worker(worker: usize, shared: &Shared, mut processor: Processor) {
    debug!(worker, "Search thread started");
    while let Some(message) = shared.next(worker) {
        match message {
            Message::Broadcast(Broadcast::SetLocale(locale)) => processor.set_locale(locale),
            Message::Broadcast(Broadcast::ClearCaches) => processor.clear_caches(),
            Message::Broadcast(Broadcast::SetConfig(config)) => processor.set_config(config),
            Message::Task(mut task) => {
                task.cancel.start();
                let Task {
                    params,
                    cancel,
                    callback,
                    slot,
                } = &mut task;
                let outcome = catch_unwind(AssertUnwindSafe(|| match callback.as_mut() {
                    Some(callback) => processor.search(params, cancel, &mut **callback),
                    None => processor.search(params, cancel, &mut |_| {}),
                }));
                match outcome {
                    Ok(results) => slot.set(results),
                    Err(_) => {
                        warn!(worker, query = %params.query, "Search panicked, query ends as cancelled");
                        processor.clear_caches();
                        slot.set(cancelled());
                    }
                }
            }
        }
    }
    debug!(worker, "Search thread stopped");
}
