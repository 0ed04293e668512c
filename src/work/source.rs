// src/work/source.rs
//! Work distribution to device controllers
//!
//! [`WorkDispatcher`] fans every new template out to one bounded queue per
//! controller without ever blocking the producer. [`FileWorkSource`] is a
//! simple producer that follows a getwork reply kept on disk by an external
//! fetcher.

use crate::types::WorkMode;
use crate::utils::clock::Clock;
use crate::utils::error::MinerError;
use crate::utils::shutdown::ShutdownSignal;
use crate::work::WorkTemplate;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of each controller's inbound work queue
pub const WORK_QUEUE_DEPTH: usize = 5;

struct WorkQueue {
    sender: Sender<Arc<WorkTemplate>>,
    // Second handle on the same queue, used to discard the oldest entry.
    drain: Receiver<Arc<WorkTemplate>>,
    alive: Weak<()>,
}

/// A controller's end of its work queue
///
/// Dropping it unsubscribes the controller on the next dispatch.
pub struct WorkSubscription {
    receiver: Receiver<Arc<WorkTemplate>>,
    _alive: Arc<()>,
}

impl Deref for WorkSubscription {
    type Target = Receiver<Arc<WorkTemplate>>;

    fn deref(&self) -> &Self::Target {
        &self.receiver
    }
}

/// Fan-out of work templates to every subscribed controller
pub struct WorkDispatcher {
    latest: ArcSwapOption<WorkTemplate>,
    queues: Mutex<Vec<WorkQueue>>,
}

impl WorkDispatcher {
    /// Creates a dispatcher with no subscribers and no work
    pub fn new() -> Self {
        WorkDispatcher {
            latest: ArcSwapOption::empty(),
            queues: Mutex::new(Vec::new()),
        }
    }

    /// Registers a controller
    ///
    /// The returned queue already holds the latest template if one was
    /// issued before the controller subscribed.
    pub fn subscribe(&self) -> WorkSubscription {
        let (sender, receiver) = crossbeam_channel::bounded(WORK_QUEUE_DEPTH);
        let alive = Arc::new(());

        // Reading `latest` under the queue lock orders this against dispatch.
        let mut queues = self.lock_queues();
        if let Some(latest) = self.latest.load_full() {
            let _ = sender.try_send(latest);
        }
        queues.push(WorkQueue {
            sender,
            drain: receiver.clone(),
            alive: Arc::downgrade(&alive),
        });
        WorkSubscription {
            receiver,
            _alive: alive,
        }
    }

    /// Publishes a new template to every controller
    ///
    /// Never blocks: a full queue loses its oldest template. Queues whose
    /// controller has gone away are dropped.
    pub fn dispatch(&self, template: WorkTemplate) -> Arc<WorkTemplate> {
        let template = Arc::new(template);
        let mut queues = self.lock_queues();
        self.latest.store(Some(template.clone()));

        queues.retain(|queue| {
            if queue.alive.strong_count() == 0 {
                return false;
            }
            let mut pending = template.clone();
            loop {
                match queue.sender.try_send(pending) {
                    Ok(()) => return true,
                    Err(TrySendError::Full(t)) => {
                        log::debug!("Work queue full, discarding oldest template");
                        let _ = queue.drain.try_recv();
                        pending = t;
                    }
                    Err(TrySendError::Disconnected(_)) => return false,
                }
            }
        });

        template
    }

    /// Most recently dispatched template
    pub fn latest(&self) -> Option<Arc<WorkTemplate>> {
        self.latest.load_full()
    }

    /// Number of live subscriptions
    pub fn subscribers(&self) -> usize {
        self.lock_queues().len()
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, Vec<WorkQueue>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for WorkDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Follows a getwork reply stored in a file
pub struct FileWorkSource {
    path: PathBuf,
    mode: WorkMode,
    interval: Duration,
    clock: Arc<dyn Clock>,
    last_seen: Option<String>,
}

impl FileWorkSource {
    /// Creates a source that re-reads `path` every `interval`
    pub fn new(
        path: impl Into<PathBuf>,
        mode: WorkMode,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        FileWorkSource {
            path: path.into(),
            mode,
            interval,
            clock,
            last_seen: None,
        }
    }

    /// Reads the file once and dispatches it if its content changed
    ///
    /// # Returns
    /// `Ok(true)` when a new template was dispatched
    pub fn poll_once(&mut self, dispatcher: &WorkDispatcher) -> Result<bool, MinerError> {
        let content = std::fs::read_to_string(&self.path)?;
        if self.last_seen.as_deref() == Some(content.as_str()) {
            return Ok(false);
        }

        let template = WorkTemplate::from_getwork(&content, self.mode, self.clock.unix_now())?;
        log::info!(
            "New {} work from {} (timestamp {})",
            self.mode,
            self.path.display(),
            template.job_time
        );
        log::trace!("Work data: {}", hex::encode(&template.data[..]));
        dispatcher.dispatch(template);
        self.last_seen = Some(content);
        Ok(true)
    }

    /// Polls on a background thread until shutdown
    pub fn spawn(
        mut self,
        dispatcher: Arc<WorkDispatcher>,
        shutdown: ShutdownSignal,
    ) -> Result<JoinHandle<()>, MinerError> {
        let handle = std::thread::Builder::new()
            .name("work-source".into())
            .spawn(move || {
                loop {
                    if let Err(e) = self.poll_once(&dispatcher) {
                        log::warn!("Failed to load work from {}: {}", self.path.display(), e);
                    }
                    if shutdown.wait_timeout(self.interval) {
                        break;
                    }
                }
            })?;
        Ok(handle)
    }
}
