//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use offline_sync::cache::{CacheKey, QueryParams};
use offline_sync::error::{TransportError, TransportResult};
use offline_sync::queue::Operation;
use offline_sync::transport::{Ack, Transport};
use offline_sync::{
    CacheStore, ConnectivityMonitor, Database, EngineSettings, ManualClock, SyncEngine, SyncQueue,
};

/// Transport whose answers are scripted per endpoint.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    offline: AtomicBool,
    pages: Mutex<HashMap<String, Vec<u8>>>,
    fetch_failures: Mutex<HashMap<String, VecDeque<TransportError>>>,
    dispatch_failures: Mutex<HashMap<String, VecDeque<TransportError>>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn serve(&self, key: &str, body: &[u8]) {
        self.pages.lock().unwrap().insert(key.to_string(), body.to_vec());
    }

    pub fn fail_fetch(&self, key: &str, error: TransportError) {
        self.fetch_failures
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn fail_dispatch(&self, endpoint: &str, error: TransportError, times: usize) {
        let mut failures = self.dispatch_failures.lock().unwrap();
        let queue = failures.entry(endpoint.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Payloads of every dispatch attempt that reached the remote, in order.
    pub fn dispatched(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, endpoint: &str, params: &QueryParams) -> TransportResult<Vec<u8>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("offline".into()));
        }
        let key = CacheKey::normalize(endpoint, params).into_string();
        if let Some(error) = self.fetch_failures.lock().unwrap().get_mut(&key).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        self.pages.lock().unwrap().get(&key).cloned().ok_or(TransportError::Status {
            status: 404,
            message: key,
        })
    }

    async fn dispatch(&self, _operation: Operation, endpoint: &str, payload: &[u8]) -> TransportResult<Ack> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("offline".into()));
        }
        self.log
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(payload).into_owned());

        match self
            .dispatch_failures
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(Ack::new(200)),
        }
    }

    async fn probe(&self) -> TransportResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TransportError::Unreachable("offline".into()))
        } else {
            Ok(())
        }
    }
}

/// Engine over an in-memory database and a scripted transport.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub cache: CacheStore,
    pub queue: SyncQueue,
    pub monitor: ConnectivityMonitor,
    pub transport: Arc<ScriptedTransport>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(reachable: bool) -> Self {
        Self::with_db(Database::in_memory().unwrap(), ManualClock::starting_now(), reachable)
    }

    pub fn with_db(db: Database, clock: Arc<ManualClock>, reachable: bool) -> Self {
        let cache = CacheStore::new(db.clone(), clock.clone(), chrono::Duration::days(30));
        let queue = SyncQueue::new(db, clock.clone());
        let monitor = ConnectivityMonitor::new(reachable);
        let transport = ScriptedTransport::new();
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            cache.clone(),
            transport.clone(),
            monitor.clone(),
            clock.clone(),
            EngineSettings::default(),
        ));
        Self {
            clock,
            cache,
            queue,
            monitor,
            transport,
            engine,
        }
    }

    pub fn update(&self, resource_key: &str, endpoint: &str, body: &str) -> i64 {
        self.queue
            .enqueue(resource_key, Operation::Update, endpoint, body.as_bytes().to_vec())
            .unwrap()
    }
}
