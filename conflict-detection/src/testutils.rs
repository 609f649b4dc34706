use crate::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use options_store::{InMemoryOptionsStore, OptionsStore, StoreError};
use parking_lot::Mutex;
use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const FAKE_JS: &str = r#"{"abc123":{"type":"script","src":"http://example.com/fake.js"}}"#;
pub const FAKE_CSS: &str = r#"{"xyz456":{"type":"style","src":"http://example.com/fake.css"}}"#;
pub const FAKE_JS_AND_CSS: &str = r#"{"abc123":{"type":"script","src":"http://example.com/fake.js"},"xyz456":{"type":"style","src":"http://example.com/fake.css"}}"#;

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn test_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-10-16T12:00:00+00:00")
        .unwrap()
        .with_timezone(&Utc)
}

/// In-memory store whose reads and writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryOptionsStore,
    fail_writes: AtomicBool,
    failing_reads: Mutex<FailingReads>,
    writes: AtomicUsize,
}

#[derive(Default)]
enum FailingReads {
    #[default]
    Nothing,
    Everything,
    Key(&'static str),
}

impl FlakyStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.failing_reads.lock() = if fail {
            FailingReads::Everything
        } else {
            FailingReads::Nothing
        };
    }

    /// Fails reads of `key` only.
    pub fn fail_reads_of(&self, key: &'static str) {
        *self.failing_reads.lock() = FailingReads::Key(key);
    }

    /// Number of successful `set` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OptionsStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let fail = match *self.failing_reads.lock() {
            FailingReads::Nothing => false,
            FailingReads::Everything => true,
            FailingReads::Key(failing) => failing == key,
        };
        if fail {
            return Err(io::Error::other("connection reset").into());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(io::Error::other("disk full").into());
        }
        self.inner.set(key, value).await?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
