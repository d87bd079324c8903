//! Shared fakes for integration tests.

#![allow(dead_code)]

use dbmux_core::{DbmuxError, Engine, EngineFactory, Result, StorageLocation};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Engine that only remembers who it is and whether it was closed.
pub struct FakeEngine {
    pub name: String,
    pub closed: AtomicBool,
}

#[async_trait::async_trait]
impl Engine for FakeEngine {
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory counting boots; names listed in `failing` refuse to boot.
#[derive(Default)]
pub struct FakeFactory {
    pub boots: AtomicUsize,
    pub failing: Vec<String>,
}

impl FakeFactory {
    pub fn boots(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EngineFactory for FakeFactory {
    async fn boot(&self, name: &str, _storage: &StorageLocation) -> Result<Arc<dyn Engine>> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|n| n == name) {
            return Err(DbmuxError::Other(format!("{} refuses to boot", name)));
        }
        Ok(Arc::new(FakeEngine {
            name: name.to_string(),
            closed: AtomicBool::new(false),
        }))
    }
}
