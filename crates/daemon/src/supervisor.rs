//! Runs each accepted delivery on its own task and reports how it ended.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use checkflow_core::CheckRecord;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Succeeded { follow_ups: usize },
    Failed(String),
    Panicked(String),
}

/// Sent once per finished delivery.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub delivery_id: Uuid,
    pub message_id: String,
    pub check: String,
    pub outcome: DeliveryOutcome,
    pub elapsed: Duration,
    pub finished_at_ms: i64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    in_flight: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the delivery counters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DeliveryStats {
    pub received: u64,
    pub in_flight: u64,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct Supervisor {
    dispatcher: Arc<Dispatcher>,
    counters: Arc<Counters>,
    reports: mpsc::UnboundedSender<DeliveryReport>,
}

impl Supervisor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> (Self, mpsc::UnboundedReceiver<DeliveryReport>) {
        let (reports, rx) = mpsc::unbounded_channel();
        let sup = Self {
            dispatcher,
            counters: Arc::new(Counters::default()),
            reports,
        };
        (sup, rx)
    }

    /// Starts the delivery and returns immediately.
    ///
    /// The returned handle resolves after the report has been sent.
    pub fn accept(&self, message_id: String, record: CheckRecord) -> JoinHandle<()> {
        let delivery_id = Uuid::new_v4();
        let check = record.display_name();
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
        tracing::info!(%delivery_id, %message_id, %check, "delivery accepted");

        let dispatcher = Arc::clone(&self.dispatcher);
        let counters = Arc::clone(&self.counters);
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            // inner task so a panicking executor surfaces as a JoinError here
            let run = tokio::spawn(async move { dispatcher.dispatch(record).await });
            let outcome = match run.await {
                Ok(Ok(follow_ups)) => DeliveryOutcome::Succeeded { follow_ups },
                Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
                Err(e) if e.is_panic() => DeliveryOutcome::Panicked(e.to_string()),
                Err(e) => DeliveryOutcome::Failed(e.to_string()),
            };

            counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            match &outcome {
                DeliveryOutcome::Succeeded { .. } => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                }
                DeliveryOutcome::Failed(error) | DeliveryOutcome::Panicked(error) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(%delivery_id, %check, %error, "delivery failed");
                }
            }

            let report = DeliveryReport {
                delivery_id,
                message_id,
                check,
                outcome,
                elapsed: started.elapsed(),
                finished_at_ms: checkflow_core::now_ms(),
            };
            // nobody listening is fine
            let _ = reports.send(report);
        })
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            received: self.counters.received.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

/// Logs every delivery report until the supervisor is dropped.
pub fn spawn_report_logger(mut rx: mpsc::UnboundedReceiver<DeliveryReport>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            tracing::info!(
                delivery_id = %report.delivery_id,
                message_id = %report.message_id,
                check = %report.check,
                outcome = ?report.outcome,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "delivery finished"
            );
        }
    })
}
