//! Time-windowed replay log of event batches.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// One published batch.
#[derive(Debug)]
pub struct CacheEntry<I> {
    pub id: u64,
    pub at: DateTime<Utc>,
    pub items: Arc<Vec<I>>,
}

/// What a (re)connecting subscriber must receive before live events.
#[derive(Debug)]
pub enum Replay<'a, I> {
    /// Client presented no id: tell it where we are.
    Handshake(u64),
    /// Client is behind, or ahead of a restarted server.
    Entries(Vec<&'a CacheEntry<I>>),
    /// Client is up to date, or sent garbage.
    Nothing,
}

/// Bounded FIFO keyed by a monotonic id.
///
/// Ids start at 1 and grow by exactly 1 per batch. Entries are only appended
/// at the tail and only evicted at the head, so the deque stays ordered by
/// both id and timestamp.
#[derive(Debug)]
pub struct ReplayCache<I> {
    entries: VecDeque<CacheEntry<I>>,
    last_id: u64,
    retention: TimeDelta,
}

impl<I> ReplayCache<I> {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            last_id: 0,
            retention: TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Id of the most recent batch, 0 before the first one.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, items: Vec<I>) -> &CacheEntry<I> {
        self.push_at(Utc::now(), items)
    }

    pub fn push_at(&mut self, at: DateTime<Utc>, items: Vec<I>) -> &CacheEntry<I> {
        self.last_id += 1;
        self.entries.push_back(CacheEntry {
            id: self.last_id,
            at,
            items: Arc::new(items),
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Drop entries older than the retention window. Returns how many went.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let Some(threshold) = now.checked_sub_signed(self.retention) else {
            return 0;
        };
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.at < threshold)
        {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// Entries strictly newer than `id`.
    pub fn since(&self, id: u64) -> impl Iterator<Item = &CacheEntry<I>> {
        let start = self.entries.partition_point(|entry| entry.id <= id);
        self.entries.range(start..)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry<I>> {
        self.entries.iter()
    }

    /// Decide what to send a subscriber presenting `last_event_id`.
    pub fn replay_for(&self, last_event_id: Option<&str>) -> Replay<'_, I> {
        let Some(raw) = last_event_id else {
            return Replay::Handshake(self.last_id);
        };
        let Ok(seen) = raw.trim().parse::<u64>() else {
            return Replay::Nothing;
        };
        if seen < self.last_id {
            Replay::Entries(self.since(seen).collect())
        } else if seen > self.last_id {
            Replay::Entries(self.entries().collect())
        } else {
            Replay::Nothing
        }
    }
}
