//! Swipe, match, chat and presence flows on top of the store, the cache and
//! the fanout dispatcher.

pub mod chat;
pub mod detector;
pub mod ledger;
pub mod matches;
pub mod presence;
pub mod retry;
pub mod session;
pub mod swipe;

use std::sync::Arc;

use tracing::error;

use rally_cache::{Cache, Invalidator};
use rally_db::Database;
use rally_gateway::Dispatcher;
use rally_types::error::{Error, Result};

pub use detector::MatchOutcome;

/// Shared handle to every collaborator the flows need. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    db: Arc<Database>,
    cache: Cache,
    invalidator: Invalidator,
    dispatcher: Dispatcher,
}

impl Engine {
    pub fn new(db: Arc<Database>, cache: Cache, dispatcher: Dispatcher) -> Self {
        let invalidator = Invalidator::new(cache.store());
        Self::with_invalidator(db, cache, invalidator, dispatcher)
    }

    pub fn with_invalidator(
        db: Arc<Database>,
        cache: Cache,
        invalidator: Invalidator,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                db,
                cache,
                invalidator,
                dispatcher,
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn cache(&self) -> &Cache {
        &self.inner.cache
    }

    /// Run a store call off the async runtime, retrying transient failures.
    pub(crate) async fn db<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: Fn(&Database) -> rally_db::Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        retry::with_backoff(op, || {
            let db = self.inner.db.clone();
            let f = f.clone();
            async move {
                tokio::task::spawn_blocking(move || f(&db))
                    .await
                    .map_err(|e| {
                        error!("spawn_blocking join error in {}: {}", op, e);
                        Error::Internal(format!("{} aborted", op))
                    })?
                    .map_err(Error::from)
            }
        })
        .await
    }
}
