// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Generic watch-driven reconciliation runtime shared by every controller:
//! a reflector-backed cache, a coalescing work queue, and worker loops that
//! call a per-controller sync handler with retry and backoff.

pub mod queue;

pub use queue::WorkQueue;

use async_trait::async_trait;
use futures::StreamExt;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{KconfigError, Result};

/// `namespace/name` identity of a watched object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        ObjectKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = KconfigError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {
                Ok(ObjectKey::new(namespace, name))
            }
            _ => Err(KconfigError::InvalidKey(raw.to_string())),
        }
    }
}

/// Per-controller synchronization logic.
///
/// Implementations must be re-entrant and side-effect idempotent: the same
/// key may be delivered again after backoff, restart, or a periodic resync.
/// Not-found on the primary object is a completed sync, not an error.
#[async_trait]
pub trait SyncHandler: Send + Sync + 'static {
    async fn sync(&self, key: &ObjectKey) -> Result<()>;
}

/// Watch-driven reconciliation loop for one resource kind
pub struct ReconcileRuntime<K, H>
where
    K: Resource,
{
    name: &'static str,
    api: Api<K>,
    handler: Arc<H>,
    workers: usize,
    resync: Option<Duration>,
}

impl<K, H> ReconcileRuntime<K, H>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default + Clone + Eq + std::hash::Hash + Send + Sync,
    H: SyncHandler,
{
    pub fn new(
        name: &'static str,
        api: Api<K>,
        handler: Arc<H>,
        workers: usize,
        resync: Option<Duration>,
    ) -> Self {
        ReconcileRuntime {
            name,
            api,
            handler,
            workers,
            resync,
        }
    }

    /// Run the controller until the shutdown signal fires.
    ///
    /// Blocks until the local cache mirroring the watched resources is fully
    /// populated, then starts the worker loops. Shutdown drains in-flight
    /// items but performs no further dequeues.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let queue = Arc::new(WorkQueue::new());
        let writer = reflector::store::Writer::<K>::default();
        let store = writer.as_reader();

        info!(controller = self.name, "Starting controller");

        let pump = {
            let queue = Arc::clone(&queue);
            let api = self.api.clone();
            let name = self.name;
            tokio::spawn(async move {
                let stream =
                    reflector(writer, watcher(api, watcher::Config::default()).default_backoff());
                futures::pin_mut!(stream);
                while let Some(event) = stream.next().await {
                    match event {
                        Ok(watcher::Event::Apply(obj))
                        | Ok(watcher::Event::InitApply(obj))
                        | Ok(watcher::Event::Delete(obj)) => {
                            queue.add(&object_key(&obj)).await;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(controller = name, error = %err, "Watch stream error");
                        }
                    }
                }
            })
        };

        // Cache sync barrier: no worker starts before the initial list lands
        store
            .wait_until_ready()
            .await
            .map_err(|err| anyhow::anyhow!("{}: reflector store failed to sync: {}", self.name, err))?;
        info!(controller = self.name, "Caches synced, starting workers");

        let resync_task = self.resync.map(|period| {
            let queue = Arc::clone(&queue);
            let store = store.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // The first tick fires immediately; the initial list already
                // enqueued everything, so skip it.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    for obj in store.state() {
                        queue.add(&object_key(obj.as_ref())).await;
                    }
                }
            })
        });

        let mut worker_handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&self.handler);
            let name = self.name;
            worker_handles.push(tokio::spawn(async move {
                while let Some(raw) = queue.next().await {
                    let key = match raw.parse::<ObjectKey>() {
                        Ok(key) => key,
                        Err(err) => {
                            warn!(controller = name, error = %err, "Dropping malformed key");
                            queue.done(&raw).await;
                            continue;
                        }
                    };
                    match handler.sync(&key).await {
                        Ok(()) => {
                            queue.forget(&raw).await;
                            debug!(controller = name, worker = worker_id, key = %raw, "Synced");
                        }
                        Err(err) => match WorkQueue::retry(&queue, &raw).await {
                            Some(delay) => warn!(
                                controller = name,
                                key = %raw,
                                error = %err,
                                delay_ms = delay.as_millis() as u64,
                                "Sync failed, retrying with backoff"
                            ),
                            None => warn!(
                                controller = name,
                                key = %raw,
                                error = %err,
                                "Sync failed and retry ceiling reached, dropping until next event"
                            ),
                        },
                    }
                    queue.done(&raw).await;
                }
            }));
        }

        // Wait for the stop signal, then drain
        let _ = shutdown.changed().await;
        info!(controller = self.name, "Shutting down, draining in-flight work");
        queue.shut_down().await;
        for handle in worker_handles {
            let _ = handle.await;
        }
        pump.abort();
        if let Some(task) = resync_task {
            task.abort();
        }
        info!(controller = self.name, "Controller stopped");
        Ok(())
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}
