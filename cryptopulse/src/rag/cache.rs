//! Bounded LRU cache of generated answers with a time-to-live.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use super::pipeline::Answer;

struct Entry {
    inserted: Instant,
    answer: Answer,
}

pub struct AnswerCache {
    entries: Mutex<LruCache<u64, Entry>>,
    ttl: Duration,
}

impl AnswerCache {
    /// `None` when `capacity` is zero, which disables caching
    pub fn new(capacity: usize, ttl: Duration) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        })
    }

    pub fn get(&self, key: u64) -> Option<Answer> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(&key) {
            Some(entry) if entry.inserted.elapsed() <= self.ttl => {
                return Some(entry.answer.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&key);
        }
        None
    }

    pub fn put(&self, key: u64, answer: Answer) {
        self.entries.lock().put(
            key,
            Entry {
                inserted: Instant::now(),
                answer,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
