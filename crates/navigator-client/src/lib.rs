// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Client library for the Airplane Navigator simulation service.
//!
//! This library provides the headless half of the navigator dashboard as
//! composable layers that can also be used independently:
//!
//! - **API layer**: typed REST client for the `/services/api` surface with
//!   bearer auth and a paginated envelope
//! - **Grid layer**: the fixed-size color buffer the dashboard renders,
//!   with validated wholesale replacement
//! - **Overlay layer**: pure per-tick derivation of the display grid from
//!   the base map, scanned cells, and live airplanes
//! - **Session layer**: token-derived identity with broadcast invalidation
//! - **Polling layer**: [`WorldPoller`], which ties the above together on a
//!   fixed interval
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::{Arc, RwLock};
//! use navigator_client::{ApiClient, GridStore, MapGrid, PollerConfig, WorldPoller};
//! use navigator_client::session::{ProviderConfig, Session};
//!
//! let session = Arc::new(Session::new(
//!     ProviderConfig {
//!         domain: "login.example.com".into(),
//!         client_id: "abc".into(),
//!         redirect_uri: "http://localhost/redirect".into(),
//!         return_to: "http://localhost".into(),
//!     },
//!     Some("<bearer token>".into()),
//! ));
//! let api = ApiClient::new("http://localhost:8000/services/api", session);
//! let grid = Arc::new(RwLock::new(GridStore::new()));
//!
//! let poller = WorldPoller::spawn(api, 1, MapGrid::new(), grid, PollerConfig::default());
//! let mut events = poller.subscribe();
//! // ... drain events, read the grid, and call poller.stop() on teardown
//! ```

pub mod api;
pub mod grid;
pub mod overlay;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use api::{
    Airplane, ApiClient, ApiError, DistributionCenter, FlightLog, Heading, InventoryItem,
    ItemRequest, NewWorld, Page, ScannedCell, UserRecord, World, WorldSummary, WorldToken,
};
pub use grid::{GridStore, MapGrid, RawGrid, Rgb, GRID_SIZE};
pub use session::{Session, SessionEvent, UserInfo};

/// Shared handle to the displayed grid.
pub type SharedGrid = Arc<RwLock<GridStore>>;

/// Events published by a [`WorldPoller`].
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Fresh airplane list applied to the grid this tick.
    Airplanes(Vec<Airplane>),
    /// An airplane was skipped for the tick; the message names it.
    OutOfBounds(String),
}

/// Poll loop tuning.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Tick interval while a base map is loaded.
    pub interval: Duration,
    /// Page size requested from the scanned-cell endpoint.
    pub scanned_page_size: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            scanned_page_size: 10_000,
        }
    }
}

/// Monotonic tick gate: completions older than the last-applied tick are
/// discarded, so overlapping in-flight requests can never publish stale
/// results over newer ones.
#[derive(Debug, Default)]
struct TickGate {
    last_applied: AtomicU64,
}

impl TickGate {
    /// Returns whether results for `tick` may be applied, and records the
    /// tick as applied if so.
    fn admit(&self, tick: u64) -> bool {
        self.last_applied.fetch_max(tick, Ordering::AcqRel) < tick
    }
}

/// Background poller for one world.
///
/// Spawns a dedicated thread driving a tokio runtime, fetches airplanes and
/// scanned cells every tick, composes the overlay against the held base map,
/// and publishes the result wholesale into the shared grid. Cancelled
/// deterministically by [`WorldPoller::stop`] or drop.
#[derive(Debug)]
pub struct WorldPoller {
    world_id: i64,
    cancel: CancellationToken,
    events: broadcast::Sender<PollEvent>,
}

impl WorldPoller {
    /// Start polling `world_id` against `base`, publishing into `grid`.
    #[must_use]
    pub fn spawn(
        api: ApiClient,
        world_id: i64,
        base: MapGrid,
        grid: SharedGrid,
        config: PollerConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (events, _) = broadcast::channel(64);

        let cancel_clone = cancel.clone();
        let events_clone = events.clone();
        info!("Starting poller for world {} every {:?}", world_id, config.interval);

        // Detached on purpose: lifetime is governed by the cancellation token
        let _ = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to build poller runtime");
            rt.block_on(poll_loop(
                api,
                world_id,
                Arc::new(base),
                grid,
                config,
                cancel_clone,
                events_clone,
            ));
        });

        Self {
            world_id,
            cancel,
            events,
        }
    }

    #[must_use]
    pub fn world_id(&self) -> i64 {
        self.world_id
    }

    /// Subscribe to per-tick events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Cancel the poll loop. In-flight requests finish but their results are
    /// dropped with the runtime.
    pub fn stop(&self) {
        info!("Stopping poller for world {}", self.world_id);
        self.cancel.cancel();
    }
}

impl Drop for WorldPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    api: ApiClient,
    world_id: i64,
    base: Arc<MapGrid>,
    grid: SharedGrid,
    config: PollerConfig,
    cancel: CancellationToken,
    events: broadcast::Sender<PollEvent>,
) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let gate = Arc::new(TickGate::default());
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        tick += 1;

        // Each tick is independent: fire and forget, the gate discards any
        // completion that loses the race to a newer one.
        tokio::spawn(run_tick(
            api.clone(),
            world_id,
            Arc::clone(&base),
            Arc::clone(&grid),
            config.scanned_page_size,
            tick,
            Arc::clone(&gate),
            events.clone(),
        ));
    }
}

#[allow(clippy::too_many_arguments, reason = "internal task entry point")]
async fn run_tick(
    api: ApiClient,
    world_id: i64,
    base: Arc<MapGrid>,
    grid: SharedGrid,
    scanned_page_size: u32,
    tick: u64,
    gate: Arc<TickGate>,
    events: broadcast::Sender<PollEvent>,
) {
    let (airplanes, scanned) = tokio::join!(
        api.list_airplanes(world_id),
        api.scanned_cells(world_id, scanned_page_size),
    );

    let (airplanes, scanned) = match (airplanes, scanned) {
        (Ok(a), Ok(s)) => (a.results, s.results),
        (Err(e), _) | (_, Err(e)) => {
            // No backoff, no retry: the next tick stands on its own
            warn!("Poll tick {} for world {} failed: {}", tick, world_id, e);
            return;
        }
    };

    let (composed, warnings) = overlay::compose(&base, &scanned, &airplanes);

    if !gate.admit(tick) {
        warn!("Discarding stale poll tick {} for world {}", tick, world_id);
        return;
    }

    grid.write()
        .expect("Grid store lock poisoned - unrecoverable state")
        .replace(composed);

    for warning in warnings {
        let _ = events.send(PollEvent::OutOfBounds(warning));
    }
    let _ = events.send(PollEvent::Airplanes(airplanes));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_gate_admits_in_order() {
        let gate = TickGate::default();
        assert!(gate.admit(1));
        assert!(gate.admit(2));
        assert!(gate.admit(5));
    }

    #[test]
    fn test_tick_gate_discards_stale_completions() {
        let gate = TickGate::default();
        assert!(gate.admit(3));
        // Ticks 1 and 2 resolved late: both discarded
        assert!(!gate.admit(1));
        assert!(!gate.admit(2));
        // Re-applying the same tick is also rejected
        assert!(!gate.admit(3));
        assert!(gate.admit(4));
    }
}
