/// Inclusive range of ledger sequences one poll asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerWindow {
    pub from: u32,
    pub to: u32,
}

/// Last ledger known to be covered by a successful poll.
///
/// The next window always reaches `back_window` ledgers behind the checkpoint
/// so events that finalize slightly out of order near the head are picked up
/// again; the reducer makes the overlap harmless.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    current: Option<u32>,
    back_window: u32,
}

impl CheckpointTracker {
    pub fn new(back_window: u32) -> Self {
        Self {
            current: None,
            back_window,
        }
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    pub fn back_window(&self) -> u32 {
        self.back_window
    }

    /// Never moves backwards.
    pub fn advance(&mut self, new_head: u32) {
        self.current = Some(match self.current {
            Some(cur) => cur.max(new_head),
            None => new_head,
        });
    }

    pub fn window(&self, head: u32) -> LedgerWindow {
        // Before the first successful poll, look back from the head itself.
        let anchor = self.current.unwrap_or(head);
        let from = anchor.saturating_sub(self.back_window);
        LedgerWindow {
            from,
            to: head.max(from),
        }
    }
}
