//! A process-local broker over tokio channels.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use super::{Acknowledge, Channel, Delivery, DeliveryStream, MessageBroker, QueueError};

type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

#[derive(Debug, Default)]
struct Counters {
    acked: AtomicUsize,
    rejected: AtomicUsize,
}

/// Competing-consumer queues held in memory.
///
/// Subscribers of the same channel share its messages, each message is
/// delivered once. Messages published before anyone subscribes are buffered.
#[derive(Debug)]
pub struct InMemoryBroker {
    senders: Mutex<HashMap<Channel, mpsc::UnboundedSender<Vec<u8>>>>,
    receivers: HashMap<Channel, SharedReceiver>,
    depth: Arc<HashMap<Channel, AtomicUsize>>,
    counters: Arc<Counters>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Creates a broker with both pipeline channels.
    pub fn new() -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for channel in Channel::ALL {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(channel, tx);
            receivers.insert(channel, Arc::new(AsyncMutex::new(rx)));
        }
        let depth = Channel::ALL.into_iter().map(|c| (c, AtomicUsize::new(0))).collect();
        Self {
            senders: Mutex::new(senders),
            receivers,
            depth: Arc::new(depth),
            counters: Arc::default(),
        }
    }

    /// Messages published to `channel` and not yet received.
    pub fn depth(&self, channel: Channel) -> usize {
        self.depth.get(&channel).map_or(0, |d| d.load(Ordering::SeqCst))
    }

    /// Deliveries acknowledged so far, across channels.
    pub fn acked(&self) -> usize {
        self.counters.acked.load(Ordering::SeqCst)
    }

    /// Deliveries rejected so far, across channels.
    pub fn rejected(&self) -> usize {
        self.counters.rejected.load(Ordering::SeqCst)
    }

    /// Stops accepting messages. Subscriptions end once their buffered
    /// messages are drained.
    pub fn close(&self) {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

struct MemoryAcker {
    counters: Arc<Counters>,
}

#[async_trait]
impl Acknowledge for MemoryAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.counters.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reject(&self) -> Result<(), QueueError> {
        self.counters.rejected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, channel: Channel, payload: &[u8]) -> Result<(), QueueError> {
        let senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = senders.get(&channel).ok_or(QueueError::Closed(channel))?;
        sender.send(payload.to_vec()).map_err(|_| QueueError::Closed(channel))?;
        if let Some(depth) = self.depth.get(&channel) {
            depth.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: Channel,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, QueueError> {
        let receiver = self.receivers.get(&channel).cloned().ok_or(QueueError::Closed(channel))?;
        tracing::debug!(%channel, consumer_tag, "Subscribed to in-memory channel.");

        let depth = Arc::clone(&self.depth);
        let counters = Arc::clone(&self.counters);
        let stream = futures::stream::unfold(receiver, move |receiver| {
            let depth = Arc::clone(&depth);
            let counters = Arc::clone(&counters);
            async move {
                let payload = receiver.lock().await.recv().await?;
                if let Some(d) = depth.get(&channel) {
                    d.fetch_sub(1, Ordering::SeqCst);
                }
                let delivery = Delivery::new(payload, Box::new(MemoryAcker { counters }));
                Some((Ok(delivery), receiver))
            }
        });
        Ok(stream.boxed())
    }
}
