//! Wall-clock anchors for countdowns, kept per (session, row).

use std::collections::HashMap;

/// "At `anchored_at`, `origin` seconds remained."
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CountdownAnchor {
    pub origin: u64,
    /// UTC epoch seconds.
    pub anchored_at: i64,
}

impl CountdownAnchor {
    pub fn new(origin: u64, anchored_at: i64) -> Self {
        Self { origin, anchored_at }
    }
}

/// Keeps `previous` while the origin is unchanged, otherwise anchors at `now`.
pub fn latch(origin: u64, now: i64, previous: Option<CountdownAnchor>) -> CountdownAnchor {
    match previous {
        Some(prev) if prev.origin == origin => prev,
        _ => CountdownAnchor::new(origin, now),
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct SessionKey {
    pub session: String,
    pub row: u32,
}

impl SessionKey {
    pub fn new(session: impl Into<String>, row: u32) -> Self {
        Self {
            session: session.into(),
            row,
        }
    }
}

/// Anchor storage for one dashboard session. Dropping it ends every countdown.
#[derive(Default, Debug)]
pub struct AnchorStore {
    anchors: HashMap<SessionKey, CountdownAnchor>,
}

impl AnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latches `origin` for `key` and stores the result.
    pub fn latch(&mut self, key: SessionKey, origin: u64, now: i64) -> CountdownAnchor {
        let previous = self.anchors.get(&key).copied();
        let anchor = latch(origin, now, previous);
        if previous != Some(anchor) {
            log::debug!(
                "anchored row {} at {} with {}s (was {:?})",
                key.row,
                anchor.anchored_at,
                origin,
                previous.map(|p| p.origin)
            );
            self.anchors.insert(key, anchor);
        }
        anchor
    }

    pub fn get(&self, key: &SessionKey) -> Option<CountdownAnchor> {
        self.anchors.get(key).copied()
    }

    /// Stores an anchor that arrived from elsewhere, e.g. a verified handoff.
    pub fn insert(&mut self, key: SessionKey, anchor: CountdownAnchor) {
        self.anchors.insert(key, anchor);
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn clear(&mut self) {
        self.anchors.clear();
    }
}
