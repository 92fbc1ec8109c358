use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::CatalogConfig;
use crate::media::{Decode, DecodeError, ImageDecoder, RasterImage, Size, SourceIdentity};
use crate::state::ItemId;

use super::job::{Completion, LoadJob, SubmitOutcome};

/// Work handed to the dispatcher task
struct Admission {
    source: SourceIdentity,
    target_size: Option<Size>,
    token: CancellationToken,
}

/// What a worker sends back. `result` is `None` when the job was cancelled
/// before a worker picked it up.
struct DecodeOutcome {
    path: PathBuf,
    result: Option<Result<RasterImage, DecodeError>>,
}

/// Book-keeping for one source with a decode pending or running
struct Flight {
    token: CancellationToken,
    /// Box this decode fits into; only submissions asking for the same box join it
    target_size: Option<Size>,
    waiting: Vec<ItemId>,
    /// Submissions that cannot join (cancelled decode or another box),
    /// run once this decode settles
    deferred: Vec<LoadJob>,
}

/// Schedules decodes off the interactive thread.
///
/// The coordinator itself lives on the interactive thread: `submit`, `cancel`
/// and `poll` are called from there, and results only ever reach the caller
/// through `poll`/`drain`. Behind it, a single dispatcher task admits jobs in
/// submission order, each one waiting for a free slot of a semaphore sized by
/// `CatalogConfig::effective_concurrency`. With one slot this is strict
/// one-at-a-time admission: the next job starts only after the previous decode
/// finished.
///
/// At most one decode per source path exists at any time. Duplicate
/// submissions with the same target size join the existing flight and share
/// its result; one asking for another size waits for it and decodes next.
pub struct LoadCoordinator {
    runtime: Option<Runtime>,
    admission_tx: mpsc::UnboundedSender<Admission>,
    result_rx: mpsc::UnboundedReceiver<DecodeOutcome>,
    flights: HashMap<PathBuf, Flight>,
    /// Completions produced on the interactive thread itself (non-images)
    ready: VecDeque<Completion>,
    root_token: CancellationToken,
    concurrency: usize,
}

impl LoadCoordinator {
    /// Coordinator backed by the `image` decoder
    pub fn new(config: &CatalogConfig) -> std::io::Result<Self> {
        Self::with_decoder(Arc::new(ImageDecoder), config)
    }

    pub fn with_decoder(decoder: Arc<dyn Decode>, config: &CatalogConfig) -> std::io::Result<Self> {
        let concurrency = config.effective_concurrency();

        // Decodes run on the blocking pool, capped to the admission bound
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .max_blocking_threads(concurrency)
            .thread_name("decode-worker")
            .enable_all()
            .build()?;

        let (admission_tx, admission_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let limiter = Arc::new(Semaphore::new(concurrency));

        runtime.spawn(dispatch(admission_rx, limiter, decoder, result_tx));

        info!("[LoadCoordinator] Started with {} decode slot(s)", concurrency);

        Ok(Self {
            runtime: Some(runtime),
            admission_tx,
            result_rx,
            flights: HashMap::new(),
            ready: VecDeque::new(),
            root_token: CancellationToken::new(),
            concurrency,
        })
    }

    /// Queue a decode. Never blocks; the result arrives through `poll`/`drain`.
    pub fn submit(&mut self, job: LoadJob) -> SubmitOutcome {
        let path = job.source.path().to_path_buf();

        if !job.source.is_image() {
            debug!("[LoadCoordinator] Not an image, settling immediately: {:?}", path);
            self.ready.push_back(Completion {
                result: Err(DecodeError::UnsupportedFormat(path.clone())),
                source: path,
                items: vec![job.item],
            });
            return SubmitOutcome::Settled;
        }

        if let Some(flight) = self.flights.get_mut(&path) {
            if flight.token.is_cancelled() || flight.target_size != job.target_size {
                debug!("[LoadCoordinator] Deferring behind running decode: {:?}", path);
                // The item wants this result no more
                flight.waiting.retain(|&waiting| waiting != job.item);
                if flight.waiting.is_empty() {
                    flight.token.cancel();
                }
                flight.deferred.retain(|deferred| deferred.item != job.item);
                flight.deferred.push(job);
                return SubmitOutcome::Deferred;
            }
            if !flight.waiting.contains(&job.item) {
                flight.waiting.push(job.item);
            }
            debug!("[LoadCoordinator] Coalesced into running decode: {:?}", path);
            return SubmitOutcome::Coalesced;
        }

        self.admit(job);
        SubmitOutcome::Admitted
    }

    fn admit(&mut self, job: LoadJob) {
        let path = job.source.path().to_path_buf();
        let token = self.root_token.child_token();
        let target_size = job.target_size;

        let admission = Admission {
            source: job.source,
            target_size: job.target_size,
            token: token.clone(),
        };

        if self.admission_tx.send(admission).is_err() {
            error!("[LoadCoordinator] Dispatcher is gone, failing job: {:?}", path);
            self.ready.push_back(Completion {
                result: Err(DecodeError::WorkerPanicked {
                    path: path.clone(),
                    message: "dispatcher stopped".to_string(),
                }),
                source: path,
                items: vec![job.item],
            });
            return;
        }

        debug!("[LoadCoordinator] Admitted: {:?}", path);
        self.flights.insert(
            path,
            Flight {
                token,
                target_size,
                waiting: vec![job.item],
                deferred: Vec::new(),
            },
        );
    }

    /// Drop interest in every pending decode for `path`.
    ///
    /// Advisory: a decode that already started runs to completion and its
    /// result is discarded.
    pub fn cancel(&mut self, path: &Path) {
        if let Some(flight) = self.flights.get_mut(path) {
            debug!("[LoadCoordinator] Cancelled: {:?}", path);
            flight.token.cancel();
            flight.waiting.clear();
            flight.deferred.clear();
        }
        self.ready.retain(|c| c.source != path);
    }

    /// Stop waiting on `path` for a single item. The decode itself is
    /// cancelled once no item waits on it anymore.
    pub fn detach(&mut self, item: ItemId, path: &Path) {
        if let Some(flight) = self.flights.get_mut(path) {
            flight.waiting.retain(|&waiting| waiting != item);
            flight.deferred.retain(|job| job.item != item);
            if flight.waiting.is_empty() && !flight.token.is_cancelled() {
                debug!("[LoadCoordinator] Last waiter left, cancelling: {:?}", path);
                flight.token.cancel();
            }
        }
        for completion in self.ready.iter_mut() {
            completion.items.retain(|&waiting| waiting != item);
        }
        self.ready.retain(|c| !c.items.is_empty());
    }

    /// Cancel everything pending or in flight
    pub fn cancel_all(&mut self) {
        self.root_token.cancel();
        self.root_token = CancellationToken::new();
        for flight in self.flights.values_mut() {
            flight.waiting.clear();
            flight.deferred.clear();
        }
        self.ready.clear();
    }

    /// Collect every completion available right now without blocking
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut settled: Vec<Completion> = self.ready.drain(..).collect();
        while let Ok(outcome) = self.result_rx.try_recv() {
            if let Some(completion) = self.settle(outcome) {
                settled.push(completion);
            }
        }
        settled.extend(self.ready.drain(..));
        settled
    }

    /// Block the calling thread until nothing is pending or in flight.
    ///
    /// Must not be called from inside an async runtime.
    pub fn drain(&mut self) -> Vec<Completion> {
        let mut settled = self.poll();
        while !self.flights.is_empty() {
            let Some(outcome) = self.result_rx.blocking_recv() else {
                warn!("[LoadCoordinator] Result channel closed with {} decode(s) outstanding", self.flights.len());
                self.flights.clear();
                break;
            };
            if let Some(completion) = self.settle(outcome) {
                settled.push(completion);
            }
        }
        settled.extend(self.ready.drain(..));
        settled
    }

    /// Await the next completion. Returns `None` once nothing is outstanding.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        loop {
            if let Some(completion) = self.ready.pop_front() {
                return Some(completion);
            }
            if self.flights.is_empty() {
                return None;
            }
            let outcome = self.result_rx.recv().await?;
            if let Some(completion) = self.settle(outcome) {
                return Some(completion);
            }
        }
    }

    /// Turn a worker outcome into a completion for the items still waiting
    fn settle(&mut self, outcome: DecodeOutcome) -> Option<Completion> {
        let flight = self.flights.remove(&outcome.path)?;

        let completion = match outcome.result {
            Some(result) if !flight.token.is_cancelled() && !flight.waiting.is_empty() => {
                if let Err(e) = &result {
                    warn!("[LoadCoordinator] {}", e);
                }
                Some(Completion {
                    source: outcome.path,
                    items: flight.waiting,
                    result: result.map(Arc::new),
                })
            }
            _ => {
                debug!("[LoadCoordinator] Discarding cancelled result: {:?}", outcome.path);
                None
            }
        };

        for job in flight.deferred {
            self.submit(job);
        }

        completion
    }

    pub fn is_idle(&self) -> bool {
        self.flights.is_empty() && self.ready.is_empty()
    }

    /// Whether a decode for `path` is pending or running
    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.flights.contains_key(path)
    }

    pub fn in_flight_count(&self) -> usize {
        self.flights.len()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

impl Drop for LoadCoordinator {
    fn drop(&mut self) {
        self.root_token.cancel();
        // Don't wait for running decodes; their results have nowhere to go
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Admit jobs one after another, each waiting for a free decode slot
async fn dispatch(
    mut admissions: mpsc::UnboundedReceiver<Admission>,
    limiter: Arc<Semaphore>,
    decoder: Arc<dyn Decode>,
    results: mpsc::UnboundedSender<DecodeOutcome>,
) {
    while let Some(admission) = admissions.recv().await {
        let Ok(permit) = limiter.clone().acquire_owned().await else {
            break;
        };

        let Admission { source, target_size, token } = admission;
        let path = source.path().to_path_buf();

        if token.is_cancelled() {
            debug!("[LoadCoordinator] Task cancelled before start: {:?}", path);
            let _ = results.send(DecodeOutcome { path, result: None });
            continue;
        }

        let decoder = decoder.clone();
        let results = results.clone();

        tokio::spawn(async move {
            let joined = tokio::task::spawn_blocking(move || decoder.decode(&source, target_size)).await;
            drop(permit);

            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("[LoadCoordinator] Task panicked for {:?}: {:?}", path, e);
                    Err(DecodeError::WorkerPanicked {
                        path: path.clone(),
                        message: e.to_string(),
                    })
                }
            };

            if let Err(e) = results.send(DecodeOutcome { path, result: Some(result) }) {
                warn!("[LoadCoordinator] Failed to send result: {}", e);
            }
        });
    }
}
