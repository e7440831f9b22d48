//! The polling cache: a periodically refreshed snapshot and its rendered forms.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::SplitioBinding;
use crate::config::PollerConfig;
use crate::error::{Error, Result};
use crate::serializer::{Serializer, EMPTY_CACHE_MARKER};
use crate::snapshot::Snapshot;
use crate::store::{ChangeFetcher, FetchedSegments};
use crate::util::{normalize_names, subset_key};

/// What page renderers need from a source of preload payloads.
#[async_trait]
pub trait SerializedDataProvider: Send + Sync {
    /// Refresh once, then keep refreshing in the background.
    async fn start(&self);

    /// Stop refreshing. Data already published stays readable.
    async fn stop(&self);

    /// The payload for the splits named in `names`, or for every split if `names` is empty.
    async fn get_serialized_data(&self, names: &[String]) -> String;
}

/// The unit published to readers: a snapshot and everything rendered from it.
///
/// Bundles are never modified once published; a refresh or a newly memoized subset publishes
/// a whole new bundle. Subset renderings are keyed by their sorted, deduplicated names.
#[derive(Clone, Debug)]
pub struct CacheBundle {
    snapshot: Arc<Snapshot>,
    serialized: String,
    subsets: HashMap<Vec<String>, String>,
}

impl CacheBundle {
    fn empty() -> Self {
        Self {
            snapshot: Arc::new(Snapshot::empty()),
            serialized: EMPTY_CACHE_MARKER.to_string(),
            subsets: HashMap::new(),
        }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn serialized_data(&self) -> &str {
        &self.serialized
    }

    /// The memoized rendering for the splits named in `names`, in any order.
    pub fn subset(&self, names: &[String]) -> Option<&str> {
        self.subsets
            .get(&normalize_names(names))
            .map(String::as_str)
    }

    /// The name lists of every memoized subset.
    pub fn subset_names(&self) -> impl Iterator<Item = &[String]> {
        self.subsets.keys().map(Vec::as_slice)
    }
}

/// Lifecycle of a [Poller].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

enum Lifecycle {
    Idle,
    // Running the first refresh; the token lets stop interrupt it.
    Starting(CancellationToken),
    Running(PollTask),
    Stopped,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// State shared between the poller handle and its background task.
struct Shared {
    bundle: ArcSwap<CacheBundle>,
    fetcher: Arc<dyn ChangeFetcher>,
    serializer: Serializer,
    errors: mpsc::Sender<Error>,
}

/// Keeps a snapshot of splits and segments fresh and serves it pre-rendered.
///
/// Reads never lock: they load the current [CacheBundle] and return from it. Start and stop
/// may be called any number of times, in alternation.
pub struct Poller {
    shared: Arc<Shared>,
    polling_interval: Duration,
    lifecycle: Mutex<Lifecycle>,
    errors: std::sync::Mutex<Option<mpsc::Receiver<Error>>>,
}

impl Poller {
    pub fn new(config: &PollerConfig, fetcher: Arc<dyn ChangeFetcher>) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(config.error_channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                bundle: ArcSwap::from_pointee(CacheBundle::empty()),
                serializer: Serializer::new(fetcher.clone(), config.serialize_segments),
                fetcher,
                errors: errors_tx,
            }),
            polling_interval: config.effective_polling_interval(),
            lifecycle: Mutex::new(Lifecycle::Idle),
            errors: std::sync::Mutex::new(Some(errors_rx)),
        }
    }

    /// Builds a poller backed by a [SplitioBinding].
    pub fn from_config(config: &PollerConfig) -> Result<Self> {
        let binding = SplitioBinding::new(config)?;
        Ok(Self::new(config, Arc::new(binding)))
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Hands out the receiving end of the error channel, which yields one error per failed
    /// refresh. Only the first call gets it.
    ///
    /// Errors are dropped, with a log line, while the channel is full.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<Error>> {
        self.errors.lock().ok().and_then(|mut errors| errors.take())
    }

    pub async fn state(&self) -> PollerState {
        match *self.lifecycle.lock().await {
            Lifecycle::Idle => PollerState::Idle,
            Lifecycle::Starting(_) | Lifecycle::Running(_) => PollerState::Running,
            Lifecycle::Stopped => PollerState::Stopped,
        }
    }

    /// Refreshes once, then spawns the background loop onto the current tokio runtime.
    ///
    /// The lifecycle lock is not held during the first refresh; a stop issued meanwhile
    /// discards that refresh and no loop is spawned.
    pub async fn start(&self) {
        let cancel = CancellationToken::new();
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if let Lifecycle::Starting(_) | Lifecycle::Running(_) = *lifecycle {
                warn!("poller already running; ignoring start");
                return;
            }
            *lifecycle = Lifecycle::Starting(cancel.clone());
        }

        self.shared.refresh(&cancel).await;

        let mut lifecycle = self.lifecycle.lock().await;
        if cancel.is_cancelled() {
            debug!("poller stopped during its first refresh");
            return;
        }
        let handle = tokio::spawn(poll(
            self.shared.clone(),
            self.polling_interval,
            cancel.clone(),
        ));
        *lifecycle = Lifecycle::Running(PollTask { cancel, handle });
        info!(
            "started polling every {}s",
            self.polling_interval.as_secs_f64()
        );
    }

    /// Stops the background loop and waits for it to exit.
    ///
    /// A refresh already fetching when this is called runs its requests to completion but
    /// does not publish.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Starting(cancel) => {
                cancel.cancel();
                info!("stopped polling before the first refresh completed");
            }
            Lifecycle::Running(task) => {
                task.cancel.cancel();
                if let Err(e) = task.handle.await {
                    warn!("polling task ended abnormally: {}", e);
                }
                info!("stopped polling");
            }
            previous => {
                *lifecycle = previous;
                warn!("poller not running; ignoring stop");
            }
        }
    }

    /// The currently published bundle.
    pub fn bundle(&self) -> Arc<CacheBundle> {
        self.shared.bundle.load_full()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.bundle.load().snapshot.clone()
    }

    /// The rendering of every split.
    pub fn serialized_data(&self) -> String {
        self.shared.bundle.load().serialized.clone()
    }

    /// The rendering for the splits named in `names`.
    ///
    /// The first request for a set of names renders it against the current snapshot and
    /// memoizes it; later refreshes keep that rendering up to date, so repeat requests are a
    /// single lookup.
    pub async fn get_serialized_data(&self, names: &[String]) -> String {
        if names.is_empty() {
            return self.serialized_data();
        }
        let names = normalize_names(names);
        loop {
            let bundle = self.shared.bundle.load_full();
            if let Some(serialized) = bundle.subsets.get(&names) {
                return serialized.clone();
            }

            let serialized = self.shared.serializer.render(&bundle.snapshot, &names).await;
            if self
                .shared
                .memoize(&bundle.snapshot, names.clone(), serialized.clone())
            {
                return serialized;
            }
            debug!(
                "snapshot replaced while rendering subset {}; rendering again",
                subset_key(&names)
            );
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        match self.lifecycle.get_mut() {
            Lifecycle::Starting(cancel) => cancel.cancel(),
            Lifecycle::Running(task) => task.cancel.cancel(),
            Lifecycle::Idle | Lifecycle::Stopped => {}
        }
    }
}

#[async_trait]
impl SerializedDataProvider for Poller {
    async fn start(&self) {
        Poller::start(self).await
    }

    async fn stop(&self) {
        Poller::stop(self).await
    }

    async fn get_serialized_data(&self, names: &[String]) -> String {
        Poller::get_serialized_data(self, names).await
    }
}

async fn poll(shared: Arc<Shared>, period: Duration, cancel: CancellationToken) {
    // The first refresh already happened in start.
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => shared.refresh(&cancel).await,
        }
    }
    debug!("polling loop exited");
}

impl Shared {
    /// Runs one refresh cycle. Nothing is published if any fetch fails or if `cancel` fired
    /// while the cycle was running.
    ///
    /// Subsets memoized while the cycle renders are picked up before publishing, so none is
    /// lost to the swap.
    async fn refresh(&self, cancel: &CancellationToken) {
        let splits = match self.fetcher.fetch_splits().await {
            Ok(splits) => splits,
            Err(e) => return self.report(e),
        };

        let segments = if self.serializer.serialize_segments() {
            match self.fetcher.fetch_segments_for_splits(&splits.splits).await {
                Ok(segments) => segments,
                Err(e) => return self.report(e),
            }
        } else {
            FetchedSegments::default()
        };

        let snapshot = Arc::new(Snapshot::new(splits, segments));
        let serialized = self.serializer.render_all(&snapshot);

        let mut subsets: HashMap<Vec<String>, String> = HashMap::new();
        loop {
            let current = self.bundle.load_full();
            let pending: Vec<Vec<String>> = current
                .subsets
                .keys()
                .filter(|names| !subsets.contains_key(*names))
                .cloned()
                .collect();
            for names in pending {
                let rendered = self.serializer.render(&snapshot, &names).await;
                subsets.insert(names, rendered);
            }

            if cancel.is_cancelled() {
                debug!("discarding refresh at {} after stop", snapshot.since());
                return;
            }

            let next = Arc::new(CacheBundle {
                snapshot: snapshot.clone(),
                serialized: serialized.clone(),
                subsets: subsets.clone(),
            });
            let previous = self.bundle.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                break;
            }
            debug!("subsets memoized during refresh; rendering them before publishing");
        }

        debug!(
            "published snapshot at {} with {} splits and {} memoized subsets",
            snapshot.since(),
            snapshot.splits().len(),
            subsets.len()
        );
    }

    // Adds a subset rendering to the published bundle, provided the bundle still holds the
    // snapshot it was rendered from. Returns false if a refresh landed in between.
    fn memoize(
        &self,
        rendered_from: &Arc<Snapshot>,
        names: Vec<String>,
        serialized: String,
    ) -> bool {
        let mut memoized = false;
        self.bundle.rcu(|current| {
            memoized = Arc::ptr_eq(&current.snapshot, rendered_from);
            if !memoized {
                return Arc::clone(current);
            }
            let mut subsets = current.subsets.clone();
            subsets.insert(names.clone(), serialized.clone());
            Arc::new(CacheBundle {
                snapshot: current.snapshot.clone(),
                serialized: current.serialized.clone(),
                subsets,
            })
        });
        memoized
    }

    fn report(&self, e: Error) {
        warn!("refresh failed: {}", e);
        match self.errors.try_send(e) {
            Ok(()) => {}
            Err(TrySendError::Full(e)) => warn!("error channel full; dropping error: {}", e),
            Err(TrySendError::Closed(_)) => debug!("error channel closed"),
        }
    }
}
