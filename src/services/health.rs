//! Object-store health gate.
//!
//! A single background task probes the store on a fixed interval and flips
//! a shared boolean. The flag gates the upload pipeline only; deletes and
//! reads stay available through a transient store outage.

use crate::services::object_store::ObjectStore;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use tracing::{info, warn};

/// How often the store is probed.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Cloneable handle over the store-health flag.
///
/// Starts unhealthy (fail closed): uploads are refused until the first
/// probe succeeds. Handlers and the probe task share it with nothing more
/// than atomic loads and stores.
#[derive(Clone, Debug)]
pub struct HealthState {
    healthy: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// One reachability probe: can the store list its buckets?
pub async fn probe_store(store: &ObjectStore) -> bool {
    match store.list_buckets().await {
        Ok(_) => true,
        Err(err) => {
            warn!("object store probe failed: {err}");
            false
        }
    }
}

/// Background loop refreshing `state` every `period`. The first tick fires
/// immediately so startup does not wait a full interval for the gate to
/// open. Transitions are logged; steady states are not.
pub async fn run_monitor(store: ObjectStore, state: HealthState, period: Duration) {
    let mut interval = tokio::time::interval(period);
    let mut last = state.is_healthy();
    loop {
        interval.tick().await;
        let healthy = probe_store(&store).await;
        state.set(healthy);
        if healthy != last {
            if healthy {
                info!("object store reachable; uploads enabled");
            } else {
                warn!("object store unreachable; uploads disabled");
            }
            last = healthy;
        }
    }
}
