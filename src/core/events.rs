/*!
 * Event Sink
 * Single injected callback that receives process and build notifications
 */

use std::fmt;
use std::sync::Arc;

/// Callback invoked for every emitted event
pub type EventCallback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Fire-and-forget event sink
///
/// Events are dispatched synchronously on the emitting task; a slow handler
/// delays the operation that emitted. Without a handler events are dropped.
pub struct EventSink<E> {
    handler: Option<EventCallback<E>>,
}

impl<E> EventSink<E> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(E) + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
        }
    }

    /// Sink that drops every event
    pub fn disconnected() -> Self {
        Self { handler: None }
    }

    pub fn is_connected(&self) -> bool {
        self.handler.is_some()
    }

    #[inline]
    pub fn emit(&self, event: E) {
        if let Some(handler) = &self.handler {
            handler(event);
        }
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<E> Default for EventSink<E> {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl<E> fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("connected", &self.is_connected())
            .finish()
    }
}
