use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::dispatch::UiDispatcher;
use crate::models::NotificationEvent;

pub type NotificationListener = Arc<dyn Fn(NotificationEvent) + Send + Sync + 'static>;

#[derive(Default)]
struct InitialLatch {
    event: Option<NotificationEvent>,
    consumed: bool,
}

/// Routes decoded events to the single foreground and opened observers and
/// keeps the cold-start latch.
pub struct NotificationRouter {
    dispatcher: UiDispatcher,
    show_foreground_notification: bool,
    foreground_listener: Mutex<Option<NotificationListener>>,
    opened_listener: Mutex<Option<NotificationListener>>,
    initial: Mutex<InitialLatch>,
}

impl NotificationRouter {
    pub fn new(dispatcher: UiDispatcher, show_foreground_notification: bool) -> Self {
        Self {
            dispatcher,
            show_foreground_notification,
            foreground_listener: Mutex::new(None),
            opened_listener: Mutex::new(None),
            initial: Mutex::new(InitialLatch::default()),
        }
    }

    /// Replaces any previous foreground observer.
    pub fn set_foreground_listener(&self, listener: Option<NotificationListener>) {
        *lock(&self.foreground_listener) = listener;
    }

    /// Replaces any previous opened observer.
    pub fn set_opened_listener(&self, listener: Option<NotificationListener>) {
        *lock(&self.opened_listener) = listener;
    }

    /// A platform notification is shown unless the app is foregrounded and
    /// foreground notifications are disabled.
    pub fn should_display(&self, in_foreground: bool) -> bool {
        !in_foreground || self.show_foreground_notification
    }

    pub fn route_foreground(&self, event: NotificationEvent) {
        let listener = lock(&self.foreground_listener).clone();
        match listener {
            Some(listener) => self.dispatcher.post(move || listener(event)),
            None => debug!("No foreground listener set"),
        }
    }

    pub fn route_opened(&self, event: NotificationEvent) {
        {
            let mut latch = lock(&self.initial);
            if !latch.consumed {
                latch.event = Some(event.clone());
            }
        }

        let listener = lock(&self.opened_listener).clone();
        match listener {
            Some(listener) => self.dispatcher.post(move || listener(event)),
            None => debug!("No opened listener set"),
        }
    }

    /// Answers "did the process start from a notification" exactly once.
    pub fn consume_initial(&self) -> Option<NotificationEvent> {
        let mut latch = lock(&self.initial);
        if latch.consumed {
            return None;
        }
        let event = latch.event.take()?;
        latch.consumed = true;
        Some(event)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
