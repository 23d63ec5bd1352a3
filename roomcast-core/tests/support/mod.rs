//! In-memory fakes for exercising the preload service end to end.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use roomcast_core::{PlayerFactory, Result, RoomcastError, RoomDirectory};
use roomcast_model::{Host, RoomId};

/// Stand-in for the external player resource: just a serial number whose
/// liveness is controlled from the test through the shared ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakePlayer {
    pub serial: u32,
}

/// Shared record of everything the factory was asked to do.
#[derive(Default)]
pub struct FactoryLedger {
    next_serial: AtomicU32,
    destroyed: Mutex<Vec<u32>>,
    dead: Mutex<HashSet<u32>>,
    fail_create: AtomicBool,
    resets: AtomicU32,
    parked: Mutex<HashSet<u32>>,
}

impl FactoryLedger {
    pub fn created_count(&self) -> u32 {
        self.next_serial.load(Ordering::SeqCst)
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.lock().len()
    }

    /// How many times a specific player was destroyed; must never exceed 1.
    pub fn destroy_count_of(&self, serial: u32) -> usize {
        self.destroyed.lock().iter().filter(|s| **s == serial).count()
    }

    /// Make `serial` fail every subsequent liveness probe.
    pub fn kill(&self, serial: u32) {
        self.dead.lock().insert(serial);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn reset_count(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn is_parked(&self, serial: u32) -> bool {
        self.parked.lock().contains(&serial)
    }
}

pub struct FakeFactory {
    ledger: Arc<FactoryLedger>,
}

impl FakeFactory {
    pub fn new() -> (Self, Arc<FactoryLedger>) {
        let ledger = Arc::new(FactoryLedger::default());
        (
            Self {
                ledger: ledger.clone(),
            },
            ledger,
        )
    }
}

impl PlayerFactory for FakeFactory {
    type Handle = FakePlayer;

    fn create(&mut self, room: &RoomId) -> Result<FakePlayer> {
        if self.ledger.fail_create.load(Ordering::SeqCst) {
            return Err(RoomcastError::CreationFailed(format!(
                "factory offline for room {room}"
            )));
        }
        let serial = self.ledger.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(FakePlayer { serial })
    }

    fn destroy(&mut self, handle: FakePlayer) {
        self.ledger.destroyed.lock().push(handle.serial);
    }

    fn probe(&self, handle: &FakePlayer) -> bool {
        !self.ledger.dead.lock().contains(&handle.serial)
    }

    fn park(&mut self, handle: &mut FakePlayer) {
        self.ledger.parked.lock().insert(handle.serial);
    }

    fn restore(&mut self, handle: &mut FakePlayer) {
        self.ledger.parked.lock().remove(&handle.serial);
    }

    fn reset(&mut self, _handle: &mut FakePlayer) {
        self.ledger.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Shared record of directory traffic.
#[derive(Default)]
pub struct DirectoryLedger {
    hosts: Mutex<HashMap<RoomId, Host>>,
    failing: Mutex<HashSet<RoomId>>,
    fetch_counts: Mutex<HashMap<RoomId, u32>>,
    manifest_prefetches: AtomicU32,
}

impl DirectoryLedger {
    pub fn add_host(&self, room: &str) {
        self.hosts.lock().insert(
            RoomId::from(room),
            Host {
                name: format!("host-{room}"),
                room_name: format!("room-{room}"),
                avatar: format!("https://cdn.example/{room}.png"),
                follower_num: 1_000,
            },
        );
    }

    pub fn fail_room(&self, room: &str) {
        self.failing.lock().insert(RoomId::from(room));
    }

    pub fn clear_failure(&self, room: &str) {
        self.failing.lock().remove(&RoomId::from(room));
    }

    pub fn fetch_count(&self, room: &str) -> u32 {
        self.fetch_counts
            .lock()
            .get(&RoomId::from(room))
            .copied()
            .unwrap_or(0)
    }

    pub fn manifest_prefetch_count(&self) -> u32 {
        self.manifest_prefetches.load(Ordering::SeqCst)
    }
}

pub struct FakeDirectory {
    ledger: Arc<DirectoryLedger>,
}

impl FakeDirectory {
    pub fn new() -> (Self, Arc<DirectoryLedger>) {
        let ledger = Arc::new(DirectoryLedger::default());
        (
            Self {
                ledger: ledger.clone(),
            },
            ledger,
        )
    }
}

#[async_trait]
impl RoomDirectory for FakeDirectory {
    async fn fetch_host(&self, room: &RoomId) -> Result<Host> {
        *self
            .ledger
            .fetch_counts
            .lock()
            .entry(room.clone())
            .or_insert(0) += 1;

        if self.ledger.failing.lock().contains(room) {
            return Err(RoomcastError::FetchFailed {
                room: room.clone(),
                reason: "directory unavailable".to_string(),
            });
        }
        self.ledger
            .hosts
            .lock()
            .get(room)
            .cloned()
            .ok_or_else(|| RoomcastError::FetchFailed {
                room: room.clone(),
                reason: "unknown room".to_string(),
            })
    }

    fn stream_url(&self, room: &RoomId) -> Option<String> {
        Some(format!("https://cdn.example/live/{room}/manifest.mpd"))
    }

    async fn prefetch_manifest(&self, _stream_url: &str) -> Result<()> {
        self.ledger
            .manifest_prefetches
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Route `RUST_LOG`-filtered traces to the test writer. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Let every spawned task (preload drivers, owner jobs, manifest warms) run
/// to quiescence under the paused clock.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
