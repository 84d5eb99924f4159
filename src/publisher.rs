use std::sync::{
    Arc,
    mpsc::{Receiver, SyncSender, TrySendError, sync_channel},
};

use indexmap::IndexMap;
use log::{debug, warn};

/// Channel that assembled skeleton frames are published on.
pub const SKELETON_CHANNEL: &str = "skeleton";

/// Fire-and-forget broadcast of encoded messages.
///
/// Implementations must never block the caller: if a message cannot be
/// handed over right away it is dropped, and the caller is not told.
pub trait Publisher {
    fn publish(&mut self, channel: &str, payload: &[u8]);
}

pub type Message = Arc<Vec<u8>>;

struct Subscriber {
    id: usize,
    sender: SyncSender<Message>,
}

/// In-process publisher fanning each message out to every subscriber of a
/// channel through its own bounded queue. Slow subscribers lose messages;
/// subscribers that went away are forgotten.
#[derive(Default)]
pub struct BroadcastPublisher {
    channels: IndexMap<String, Vec<Subscriber>>,
    next_id: usize,
    sent: u64,
    dropped: u64,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        BroadcastPublisher::default()
    }

    /// Subscribe to a channel. At most `capacity` messages wait for the
    /// receiver before new ones are dropped.
    pub fn subscribe(&mut self, channel: &str, capacity: usize) -> Receiver<Message> {
        let (sender, receiver) = sync_channel(capacity.max(1));
        let id = self.next_id;
        self.next_id += 1;
        self.channels
            .entry(String::from(channel))
            .or_default()
            .push(Subscriber { id, sender });
        debug!("Subscriber {} added on channel \"{}\"", id, channel);
        receiver
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, |s| s.len())
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&mut self, channel: &str, payload: &[u8]) {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return;
        };
        let message: Message = Arc::new(payload.to_vec());
        let mut sent = 0;
        let mut dropped = 0;
        subscribers.retain(|subscriber| match subscriber.sender.try_send(message.clone()) {
            Ok(()) => {
                sent += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Subscriber {} on \"{}\" went away", subscriber.id, channel);
                false
            }
        });
        if dropped > 0 {
            warn!(
                "Dropped message on \"{}\" for {} slow subscriber(s)",
                channel, dropped
            );
        }
        self.sent += sent;
        self.dropped += dropped;
    }
}
