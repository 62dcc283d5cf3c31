use std::collections::{HashMap, VecDeque};

use crate::domain::{Identity, Verdict};

/// Memoized verdicts keyed by item identity. Bounded: once the map exceeds
/// its cap, oldest-inserted entries are evicted first. Entries are never
/// mutated after insertion except by an identity collision, where the later
/// verdict overwrites in place (original insertion position kept). No TTL.
#[derive(Debug)]
pub struct VerdictCache {
    entries: HashMap<Identity, Verdict>,
    order: VecDeque<Identity>,
    cap: usize,
}

impl VerdictCache {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            cap: cap.max(1),
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&Verdict> {
        self.entries.get(identity)
    }

    pub fn put(&mut self, identity: Identity, verdict: Verdict) {
        if self.entries.insert(identity.clone(), verdict).is_none() {
            self.order.push_back(identity);
        }
        while self.entries.len() > self.cap {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
