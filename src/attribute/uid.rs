use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh identifiers for `uid` attributes.
pub trait UidGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl UidGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Hands out a fixed sequence in call order, then falls back to `$uid{n}`.
///
/// Used as a test double so generated keys are reproducible.
pub struct SequenceUidGenerator {
    queue: Mutex<VecDeque<String>>,
    fallback: AtomicU64,
}

impl SequenceUidGenerator {
    pub fn new<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(uids.into_iter().map(Into::into).collect()),
            fallback: AtomicU64::new(1),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

impl UidGenerator for SequenceUidGenerator {
    fn generate(&self) -> String {
        if let Some(next) = self.queue.lock().pop_front() {
            return next;
        }
        let n = self.fallback.fetch_add(1, Ordering::Relaxed);
        format!("$uid{n}")
    }
}

impl fmt::Debug for SequenceUidGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceUidGenerator")
            .field("remaining", &self.remaining())
            .finish()
    }
}
