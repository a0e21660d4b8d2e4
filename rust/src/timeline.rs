use std::sync::Arc;

use tokio::sync::watch;

use crate::event::Event;
use crate::merge::merge;

/// An immutable, fully merged view of the timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    /// Bumped on every publish so observers can skip redundant renders.
    pub rev: u64,
    pub events: Vec<Event>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.id.as_str()).collect()
    }
}

/// Holds the canonical timeline and publishes every new version.
///
/// Content is replaced inside the channel's lock, so a reader only ever sees a
/// complete, sorted snapshot.
#[derive(Debug)]
pub struct TimelineStore {
    tx: watch::Sender<Arc<Timeline>>,
}

impl Default for TimelineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Timeline::default()));
        Self { tx }
    }

    /// Replace the content wholesale. Only the history seed uses this.
    pub fn seed(&self, events: Vec<Event>) {
        let events = merge(&[], events);
        self.tx.send_modify(|cur| {
            *cur = Arc::new(Timeline {
                rev: cur.rev + 1,
                events,
            });
        });
    }

    /// Merge `events` into the current content and republish.
    pub fn update(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        self.tx.send_if_modified(|cur| {
            let merged = merge(&cur.events, events);
            if merged == cur.events {
                return false;
            }
            *cur = Arc::new(Timeline {
                rev: cur.rev + 1,
                events: merged,
            });
            true
        });
    }

    pub fn current(&self) -> Arc<Timeline> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Timeline>> {
        self.tx.subscribe()
    }
}
