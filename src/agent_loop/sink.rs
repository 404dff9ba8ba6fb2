//! Event notification sink: a single swappable listener slot.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use super::events::{TurnEvent, TurnEventPayload};
use crate::error::{Result, ToolLoopError};

/// Listener invoked for every turn event.
pub type EventListener = Arc<dyn Fn(&TurnEvent) -> Result<()> + Send + Sync>;

/// Listener that forwards events into an unbounded channel.
///
/// Delivery fails once the receiving side is dropped.
pub fn channel_listener(tx: mpsc::UnboundedSender<TurnEvent>) -> EventListener {
    Arc::new(move |event: &TurnEvent| {
        tx.send(event.clone())
            .map_err(|_| ToolLoopError::InvalidState("event receiver dropped".into()))
    })
}

/// Holds at most one listener. Notification never fails or panics into the
/// caller.
#[derive(Default)]
pub struct EventSink {
    slot: RwLock<Option<EventListener>>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("has_listener", &self.has_listener())
            .finish()
    }
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a listener, returning the previous one.
    pub fn set_listener(&self, listener: Option<EventListener>) -> Option<EventListener> {
        let mut slot = self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, listener)
    }

    pub fn clear_listener(&self) -> Option<EventListener> {
        self.set_listener(None)
    }

    pub fn has_listener(&self) -> bool {
        self.current().is_some()
    }

    /// Install `listener` until the returned guard is dropped, then restore
    /// whatever was installed before.
    pub fn scoped(self: &Arc<Self>, listener: EventListener) -> ListenerGuard {
        let previous = self.set_listener(Some(listener));
        ListenerGuard {
            sink: Arc::clone(self),
            previous: Some(previous),
        }
    }

    fn current(&self) -> Option<EventListener> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Deliver an event to the current listener, if any.
    ///
    /// A failed or panicking delivery is logged and reported once more as an
    /// `error` event; a failure delivering an `error` event is only logged.
    pub fn notify(&self, event: &TurnEvent) {
        let Some(listener) = self.current() else {
            return;
        };
        let Err(message) = deliver(&listener, event) else {
            return;
        };
        tracing::warn!(kind = %event.kind(), seq = event.seq, error = %message, "event delivery failed");
        if matches!(event.payload, TurnEventPayload::Error { .. }) {
            return;
        }

        let report = TurnEvent {
            turn_id: event.turn_id,
            seq: event.seq,
            timestamp: chrono::Utc::now(),
            payload: TurnEventPayload::Error {
                message: format!("failed to deliver {} event: {message}", event.kind()),
            },
        };
        if let Err(message) = deliver(&listener, &report) {
            tracing::warn!(error = %message, "error report delivery failed");
        }
    }
}

fn deliver(listener: &EventListener, event: &TurnEvent) -> std::result::Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| listener(event))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("listener panicked".to_string()),
    }
}

/// Restores the previously installed listener on drop.
pub struct ListenerGuard {
    sink: Arc<EventSink>,
    previous: Option<Option<EventListener>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.sink.set_listener(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn event(payload: TurnEventPayload) -> TurnEvent {
        TurnEvent {
            turn_id: Uuid::new_v4(),
            seq: 0,
            timestamp: chrono::Utc::now(),
            payload,
        }
    }

    fn text_event() -> TurnEvent {
        event(TurnEventPayload::AssistantMessage {
            content: "hi".into(),
        })
    }

    fn recording() -> (EventListener, Arc<Mutex<Vec<TurnEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let listener: EventListener = Arc::new(move |event: &TurnEvent| {
            sink_seen.lock().expect("lock").push(event.clone());
            Ok(())
        });
        (listener, seen)
    }

    #[test]
    fn notify_without_listener_is_noop() {
        EventSink::new().notify(&text_event());
    }

    #[test]
    fn scoped_listener_restores_previous() {
        let sink = Arc::new(EventSink::new());
        let (outer, outer_seen) = recording();
        let (inner, inner_seen) = recording();
        sink.set_listener(Some(outer));

        {
            let _guard = sink.scoped(inner);
            sink.notify(&text_event());
        }
        sink.notify(&text_event());

        assert_eq!(inner_seen.lock().unwrap().len(), 1);
        assert_eq!(outer_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn scoped_listener_restores_none() {
        let sink = Arc::new(EventSink::new());
        let (listener, _) = recording();
        drop(sink.scoped(listener));
        assert!(!sink.has_listener());
    }

    #[test]
    fn failing_listener_gets_one_error_report() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sink = EventSink::new();
        sink.set_listener(Some(Arc::new(move |_: &TurnEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ToolLoopError::InvalidState("closed".into()))
        })));

        sink.notify(&text_event());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_error_event_is_not_rereported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sink = EventSink::new();
        sink.set_listener(Some(Arc::new(move |_: &TurnEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ToolLoopError::InvalidState("closed".into()))
        })));

        sink.notify(&event(TurnEventPayload::Error {
            message: "boom".into(),
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = EventSink::new();
        sink.set_listener(Some(Arc::new(move |event: &TurnEvent| {
            if matches!(event.payload, TurnEventPayload::AssistantMessage { .. }) {
                panic!("listener bug");
            }
            sink_seen.lock().expect("lock").push(event.kind());
            Ok(())
        })));

        sink.notify(&text_event());
        assert_eq!(*seen.lock().unwrap(), vec![super::super::events::TurnEventKind::Error]);
    }

    #[tokio::test]
    async fn channel_listener_forwards_until_receiver_drops() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = channel_listener(tx);
        listener(&text_event()).unwrap();
        assert!(rx.recv().await.is_some());
        drop(rx);
        assert!(listener(&text_event()).is_err());
    }
}
