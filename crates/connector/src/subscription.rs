use std::collections::BTreeSet;

/// Desired stream set. Survives disconnects and is replayed on every new session.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    streams: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add streams, returning how many were not already present
    pub fn insert(&mut self, streams: &[String]) -> usize {
        streams
            .iter()
            .filter(|s| self.streams.insert((*s).clone()))
            .count()
    }

    /// Remove streams, returning how many were present
    pub fn remove(&mut self, streams: &[String]) -> usize {
        streams.iter().filter(|s| self.streams.remove(*s)).count()
    }

    pub fn contains(&self, stream: &str) -> bool {
        self.streams.contains(stream)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Current contents in sorted order
    pub fn snapshot(&self) -> Vec<String> {
        self.streams.iter().cloned().collect()
    }
}
