//! Instrumented in-process store: scripted replies, optional latency and a
//! gate, and a record of concurrency and call times.

use async_trait::async_trait;
use poolrace_core::store::{Query, QueryOutcome, Store, StoreError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Transient,
    Fatal,
    Panic,
}

pub struct ScriptedStore {
    respond: Box<dyn Fn(u64) -> Reply + Send + Sync>,
    latency: Duration,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedStore {
    /// `respond` maps the zero-based call index to a reply.
    pub fn new(respond: impl Fn(u64) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            gate: None,
            calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(move |_| reply)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every call blocks until it can take a permit from `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn execute(&self, _query: &Query) -> Result<QueryOutcome, StoreError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match (self.respond)(n) {
            Reply::Ok => Ok(QueryOutcome { rows_affected: 1 }),
            Reply::Transient => Err(StoreError::new(
                "ConnectionResetError",
                "read ECONNRESET",
            )),
            Reply::Fatal => Err(StoreError::new(
                "DatabaseError",
                "duplicate key value violates unique constraint",
            )),
            Reply::Panic => panic!("scripted store panic on call {n}"),
        }
    }
}
