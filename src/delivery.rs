use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::backend::StatusReporter;
use crate::metrics::{DUPLICATES_SUPPRESSED, MESSAGES_RECEIVED, STATUS_REPORTS};
use crate::models::{DeliveryStatus, NotificationEvent};

pub const SEEN_SET_CAPACITY: usize = 100;
pub const SEEN_SET_EVICTION: usize = 50;

/// Recent message ids in insertion order. Once the set grows past its
/// capacity the oldest `evict` ids are dropped in one batch.
#[derive(Debug)]
pub struct SeenSet {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
    evict: usize,
}

impl SeenSet {
    pub fn new(capacity: usize, evict: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity + 1),
            members: HashSet::with_capacity(capacity + 1),
            capacity,
            evict,
        }
    }

    /// Returns false if `id` was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.members.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());

        if self.order.len() > self.capacity {
            for old in self.order.drain(..self.evict.min(self.order.len())) {
                self.members.remove(&old);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(SEEN_SET_CAPACITY, SEEN_SET_EVICTION)
    }
}

pub struct DeliveryTracker {
    arrived: Mutex<SeenSet>,
    opened: Mutex<SeenSet>,
    reporter: Arc<dyn StatusReporter>,
    runtime: Handle,
}

impl DeliveryTracker {
    pub fn new(reporter: Arc<dyn StatusReporter>, runtime: Handle) -> Self {
        Self {
            arrived: Mutex::new(SeenSet::default()),
            opened: Mutex::new(SeenSet::default()),
            reporter,
            runtime,
        }
    }

    /// Decodes a newly arrived message and reports it delivered. Returns None
    /// for a message id that was already processed.
    pub fn on_message_arrived(
        &self,
        message_id: &str,
        data: &HashMap<String, String>,
    ) -> Option<NotificationEvent> {
        if !lock(&self.arrived).insert(message_id) {
            DUPLICATES_SUPPRESSED.with_label_values(&["arrival"]).inc();
            debug!(message_id = %message_id, "Ignoring re-delivered message");
            return None;
        }
        MESSAGES_RECEIVED.inc();

        let event = NotificationEvent::from_push_data(data);
        if let Some(delivery_id) = &event.delivery_id {
            self.report(delivery_id, DeliveryStatus::Delivered);
        }
        Some(event)
    }

    /// True the first time a message is opened; repeats have no side effect.
    pub fn on_message_opened(&self, message_id: &str, delivery_id: Option<&str>) -> bool {
        if !lock(&self.opened).insert(message_id) {
            DUPLICATES_SUPPRESSED.with_label_values(&["open"]).inc();
            debug!(message_id = %message_id, "Ignoring repeated open");
            return false;
        }

        if let Some(delivery_id) = delivery_id {
            self.report(delivery_id, DeliveryStatus::Read);
        }
        true
    }

    // Fire and forget: failures are logged, never retried
    fn report(&self, delivery_id: &str, status: DeliveryStatus) {
        let reporter = self.reporter.clone();
        let delivery_id = delivery_id.to_string();
        self.runtime.spawn(async move {
            let status_label = status.to_string();
            match reporter.report_delivery_status(&delivery_id, status).await {
                Ok(()) => {
                    STATUS_REPORTS
                        .with_label_values(&[status_label.as_str(), "ok"])
                        .inc();
                    debug!(
                        delivery_id = %delivery_id,
                        status = %status,
                        "Delivery status reported"
                    );
                }
                Err(e) => {
                    STATUS_REPORTS
                        .with_label_values(&[status_label.as_str(), "failed"])
                        .inc();
                    warn!(
                        delivery_id = %delivery_id,
                        status = %status,
                        error = %e,
                        "Failed to report delivery status"
                    );
                }
            }
        });
    }
}

fn lock(set: &Mutex<SeenSet>) -> MutexGuard<'_, SeenSet> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}
