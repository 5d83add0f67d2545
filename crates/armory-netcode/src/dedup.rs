//! Host-side duplicate detection
//!
//! Peers send requests at least once. The host keeps, per `(peer, holder)`
//! stream, the highest correlation id it processed and a short window of
//! cached responses:
//! - an id still in the window is answered again from the cache, without
//!   re-validating or mutating anything
//! - an id at or below the highest processed one but no longer cached is
//!   refused as a duplicate
//! - anything newer is fresh
//!
//! Ids are compared wrap-aware, so a stream keeps working after its keys roll
//! over `u32::MAX`.

use crate::config::DedupConfig;
use crate::messages::{CorrelationId, PeerId};
use armory_core::{HolderId, Timestamp};
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Outcome of a duplicate check
#[derive(Debug, Clone, PartialEq)]
pub enum DedupDecision<R> {
    /// Never seen; process it
    Fresh,
    /// Seen recently; resend the cached response
    Replay(R),
    /// Already processed and forgotten
    Duplicate,
}

#[derive(Debug, Clone)]
struct Stream<R> {
    highest: CorrelationId,
    cached: VecDeque<(CorrelationId, Timestamp, R)>,
}

/// Correlation window for every `(peer, holder)` stream
#[derive(Debug, Clone)]
pub struct CorrelationWindow<R> {
    config: DedupConfig,
    streams: IndexMap<(PeerId, HolderId), Stream<R>>,
}

impl<R: Clone> CorrelationWindow<R> {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            streams: IndexMap::new(),
        }
    }

    /// Classify an incoming correlation id
    pub fn check(&mut self, peer: PeerId, holder: HolderId, id: CorrelationId, now: Timestamp) -> DedupDecision<R> {
        let ttl = self.config.ttl;
        let Some(stream) = self.streams.get_mut(&(peer, holder)) else {
            return DedupDecision::Fresh;
        };

        stream.cached.retain(|(_, at, _)| now.since(*at) <= ttl);
        if let Some((_, _, response)) = stream.cached.iter().find(|(cached, _, _)| *cached == id) {
            return DedupDecision::Replay(response.clone());
        }
        if !id.is_newer_than(stream.highest) {
            return DedupDecision::Duplicate;
        }
        DedupDecision::Fresh
    }

    /// Remember the response sent for `id`
    pub fn record(&mut self, peer: PeerId, holder: HolderId, id: CorrelationId, response: R, now: Timestamp) {
        let capacity = self.config.capacity;
        let stream = self.streams.entry((peer, holder)).or_insert_with(|| Stream {
            highest: id,
            cached: VecDeque::new(),
        });
        if id.is_newer_than(stream.highest) {
            stream.highest = id;
        }
        stream.cached.push_back((id, now, response));
        while stream.cached.len() > capacity {
            stream.cached.pop_front();
        }
    }

    /// Forget every stream of a peer (disconnect)
    pub fn forget_peer(&mut self, peer: PeerId) {
        self.streams.retain(|(p, _), _| *p != peer);
    }

    /// Forget every stream of a holder (despawn)
    pub fn forget_holder(&mut self, holder: HolderId) {
        self.streams.retain(|(_, h), _| *h != holder);
    }

    /// Highest id processed on a stream
    pub fn highest(&self, peer: PeerId, holder: HolderId) -> Option<CorrelationId> {
        self.streams.get(&(peer, holder)).map(|s| s.highest)
    }
}

impl<R: Clone> Default for CorrelationWindow<R> {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}
