//! Outbound message id source.
//!
//! One instance per client session, shared by every connection of that session,
//! so ids are strictly increasing across networks and never reused.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct MessageIds {
    last: AtomicU64,
}

impl MessageIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id. The first id handed out is 1.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Most recently issued id (0 before the first call to [`next`](Self::next)).
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let ids = MessageIds::new();
        assert_eq!(ids.last(), 0);
        let a = ids.next();
        let b = ids.next();
        assert_eq!(a, 1);
        assert!(b > a);
        assert_eq!(ids.last(), b);
    }
}
