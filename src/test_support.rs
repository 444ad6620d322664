//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cache::{CacheKey, QueryParams};
use crate::error::{TransportError, TransportResult};
use crate::queue::Operation;
use crate::transport::{Ack, Transport};

#[derive(Debug, Default)]
pub struct MockTransport {
    offline: AtomicBool,
    pages: Mutex<HashMap<String, Vec<u8>>>,
    fetch_script: Mutex<HashMap<String, VecDeque<TransportResult<Vec<u8>>>>>,
    dispatch_script: Mutex<HashMap<String, VecDeque<TransportResult<Ack>>>>,
    dispatched: Mutex<Vec<(Operation, String, Vec<u8>)>>,
    fetched: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Response served for `key` whenever nothing is scripted.
    pub fn serve(&self, key: &str, body: &[u8]) {
        self.pages.lock().unwrap().insert(key.to_string(), body.to_vec());
    }

    /// One-shot fetch outcome for `key`, consumed before `serve` responses.
    pub fn script_fetch(&self, key: &str, result: TransportResult<Vec<u8>>) {
        self.fetch_script
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(result);
    }

    /// One-shot dispatch outcome for `endpoint`; unscripted dispatches succeed.
    pub fn script_dispatch(&self, endpoint: &str, result: TransportResult<Ack>) {
        self.dispatch_script
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn dispatched_payloads(&self) -> Vec<Vec<u8>> {
        self.dispatched.lock().unwrap().iter().map(|(_, _, p)| p.clone()).collect()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, endpoint: &str, params: &QueryParams) -> TransportResult<Vec<u8>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("offline".into()));
        }
        let key = CacheKey::normalize(endpoint, params).into_string();
        self.fetched.lock().unwrap().push(key.clone());

        if let Some(result) = self.fetch_script.lock().unwrap().get_mut(&key).and_then(VecDeque::pop_front) {
            return result;
        }
        self.pages.lock().unwrap().get(&key).cloned().ok_or(TransportError::Status {
            status: 404,
            message: key,
        })
    }

    async fn dispatch(&self, operation: Operation, endpoint: &str, payload: &[u8]) -> TransportResult<Ack> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("offline".into()));
        }
        self.dispatched
            .lock()
            .unwrap()
            .push((operation, endpoint.to_string(), payload.to_vec()));

        self.dispatch_script
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Ack::new(200)))
    }

    async fn probe(&self) -> TransportResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(TransportError::Unreachable("offline".into()))
        } else {
            Ok(())
        }
    }
}
