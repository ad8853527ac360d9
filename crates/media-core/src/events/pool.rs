//! Sharded delivery worker pool
//!
//! Each destination hashes to one shard. A shard worker only routes: it
//! keeps one bounded lane per destination, drained by its own task, so a
//! slow destination never holds up the others on its shard. Notifications
//! for a destination are delivered in publication order. When a shard queue
//! or a lane is full the notification is dropped and counted.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use rmedia_infra_common::{DispatchConfig, Error as InfraError, TaskManager, TaskPriority};

use super::{Destination, EventNotification, EventSink};

/// A notification bound for one destination
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub destination: Destination,
    pub notification: EventNotification,
}

/// Delivery outcome counters
#[derive(Debug, Default)]
pub(crate) struct DeliveryCounters {
    pub enqueued: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

/// Instructions for a shard worker
#[derive(Debug)]
enum Command {
    Deliver(DeliveryJob),
    /// Close the destination's lane once its backlog is delivered
    Release(Destination),
}

/// Worker pool pushing notifications through an [`EventSink`]
pub struct DeliveryPool {
    senders: Vec<mpsc::Sender<Command>>,
    receivers: Mutex<Vec<mpsc::Receiver<Command>>>,
    sink: Arc<dyn EventSink>,
    lane_capacity: usize,
    timeout: Duration,
    counters: Arc<DeliveryCounters>,
}

impl DeliveryPool {
    /// Create the shard queues. Jobs enqueued before [`start`](Self::start)
    /// wait in the queues.
    pub fn new(config: &DispatchConfig, sink: Arc<dyn EventSink>) -> Self {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity.max(1);

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..workers).map(|_| mpsc::channel::<Command>(capacity)).unzip();

        Self {
            senders,
            receivers: Mutex::new(receivers),
            sink,
            lane_capacity: capacity,
            timeout: config.delivery_timeout(),
            counters: Arc::new(DeliveryCounters::default()),
        }
    }

    /// Number of shards
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Spawn one tracked worker per shard. Fails if already started.
    pub async fn start(&self, tasks: &TaskManager) -> rmedia_infra_common::Result<usize> {
        let receivers: Vec<_> = std::mem::take(&mut *self.receivers.lock());
        if receivers.is_empty() {
            return Err(InfraError::Task("delivery workers already started".to_string()));
        }

        let count = receivers.len();
        for (index, rx) in receivers.into_iter().enumerate() {
            let worker = ShardWorker {
                index,
                sink: self.sink.clone(),
                lane_capacity: self.lane_capacity,
                timeout: self.timeout,
                counters: self.counters.clone(),
                lanes: HashMap::new(),
                drains: JoinSet::new(),
            };
            tasks
                .spawn_tracked(format!("event-delivery-{}", index), TaskPriority::Normal, worker.run(rx))
                .await?;
        }

        debug!("Started {} event delivery workers", count);
        Ok(count)
    }

    /// Queue a job on its destination's shard. Returns false if dropped.
    pub fn enqueue(&self, job: DeliveryJob) -> bool {
        let shard = self.shard_for(&job.destination);
        match self.senders[shard].try_send(Command::Deliver(job)) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(Command::Deliver(job))) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Delivery queue {} full, dropping {} for {}",
                    shard, job.notification.event_type, job.destination
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(Command::Deliver(job))) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Delivery queue {} closed, dropping {} for {}",
                    shard, job.notification.event_type, job.destination
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Let the destination's lane close after its backlog. A later job for
    /// the destination opens a fresh lane.
    pub fn release(&self, destination: &Destination) {
        let shard = self.shard_for(destination);
        if let Err(e) = self.senders[shard].try_send(Command::Release(destination.clone())) {
            debug!("Could not release lane for {} on shard {}: {}", destination, shard, e);
        }
    }

    pub(crate) fn counters(&self) -> &DeliveryCounters {
        &self.counters
    }

    fn shard_for(&self, destination: &Destination) -> usize {
        let mut hasher = DefaultHasher::new();
        destination.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }
}

/// Routes a shard's jobs into per-destination lanes
struct ShardWorker {
    index: usize,
    sink: Arc<dyn EventSink>,
    lane_capacity: usize,
    timeout: Duration,
    counters: Arc<DeliveryCounters>,
    lanes: HashMap<Destination, mpsc::Sender<EventNotification>>,
    drains: JoinSet<()>,
}

impl ShardWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Deliver(job)) => self.route(job),
                    Some(Command::Release(destination)) => {
                        if self.lanes.remove(&destination).is_some() {
                            trace!("Worker {} released lane for {}", self.index, destination);
                        }
                    }
                    None => break,
                },
                Some(joined) = self.drains.join_next(), if !self.drains.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Delivery lane on worker {} ended abnormally: {}", self.index, e);
                    }
                }
            }
        }

        // Closing every lane lets the drains finish their backlog
        self.lanes.clear();
        while self.drains.join_next().await.is_some() {}
        debug!("Event delivery worker {} stopped", self.index);
    }

    fn route(&mut self, job: DeliveryJob) {
        let DeliveryJob { destination, notification } = job;
        let lane = match self.lanes.get(&destination) {
            Some(lane) => lane.clone(),
            None => self.open_lane(&destination),
        };

        match lane.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Delivery lane for {} full, dropping {}", destination, n.event_type);
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                self.lanes.remove(&destination);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Delivery lane for {} closed, dropping {}", destination, n.event_type);
            }
        }
    }

    fn open_lane(&mut self, destination: &Destination) -> mpsc::Sender<EventNotification> {
        let (tx, rx) = mpsc::channel(self.lane_capacity);
        self.drains.spawn(drain_lane(
            destination.clone(),
            rx,
            self.sink.clone(),
            self.timeout,
            self.counters.clone(),
        ));
        self.lanes.insert(destination.clone(), tx.clone());
        trace!("Worker {} opened lane for {}", self.index, destination);
        tx
    }
}

async fn drain_lane(
    destination: Destination,
    mut rx: mpsc::Receiver<EventNotification>,
    sink: Arc<dyn EventSink>,
    timeout: Duration,
    counters: Arc<DeliveryCounters>,
) {
    while let Some(notification) = rx.recv().await {
        let event = &notification.event_type;
        match tokio::time::timeout(timeout, sink.deliver(&destination, &notification)).await {
            Ok(Ok(())) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
                trace!("Delivered {} to {}", event, destination);
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping {} for {}: {}", event, destination, e);
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Delivery of {} to {} timed out after {:?}", event, destination, timeout);
            }
        }
    }
}
