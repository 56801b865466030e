//! Progress event sinks.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::{ProgressEvent, ProgressEventKind, TRACING_TARGET};

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn ProgressSink>;

/// Receives progress events.
///
/// Delivery is fire-and-forget: a sink never fails the run.
pub trait ProgressSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Publishes events on a tokio broadcast channel.
///
/// Subscribers that fall behind by more than the channel capacity lose the
/// oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastSink {
    /// Creates a channel buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ProgressSink for BroadcastSink {
    fn emit(&self, event: &ProgressEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event.clone());
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) {
        let node_id = event.node_id.as_ref().map(|id| id.as_str()).unwrap_or_default();
        let node_name = event.node_name.as_deref().unwrap_or_default();

        match event.kind {
            ProgressEventKind::NodeError | ProgressEventKind::ExecutionError => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    kind = %event.kind,
                    execution_id = %event.execution_id,
                    node_id,
                    node_name,
                    progress = event.progress,
                    error = event.error.as_deref().unwrap_or_default(),
                    "Progress event"
                );
            }
            _ => {
                tracing::info!(
                    target: TRACING_TARGET,
                    kind = %event.kind,
                    execution_id = %event.execution_id,
                    node_id,
                    node_name,
                    status = event.status.as_deref().unwrap_or_default(),
                    progress = event.progress,
                    total_tokens = event.total_tokens,
                    "Progress event"
                );
            }
        }
    }
}

/// Forwards every event to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanoutSink {
    /// Creates an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn with_sink(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Adds a shared sink.
    pub fn with_shared(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns whether there are no sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for FanoutSink {
    fn emit(&self, event: &ProgressEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::context::ExecutionId;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut receiver = sink.subscribe();
        let id = ExecutionId::new();

        sink.emit(&ProgressEvent::new(ProgressEventKind::InitExecution, id));
        let event = receiver.recv().await.expect("event");
        assert_eq!(event.kind, ProgressEventKind::InitExecution);
        assert_eq!(event.execution_id, id);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let sink = BroadcastSink::new(1);
        sink.emit(&ProgressEvent::new(
            ProgressEventKind::InitExecution,
            ExecutionId::new(),
        ));
        assert_eq!(sink.receiver_count(), 0);
    }

    #[test]
    fn test_fanout_forwards_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();
        let fanout = FanoutSink::new()
            .with_sink(move |event: &ProgressEvent| {
                first.lock().expect("lock").push(format!("a:{}", event.kind));
            })
            .with_sink(move |event: &ProgressEvent| {
                second.lock().expect("lock").push(format!("b:{}", event.kind));
            })
            .with_sink(TracingSink)
            .with_sink(NoopSink);

        fanout.emit(&ProgressEvent::new(
            ProgressEventKind::NodeStart,
            ExecutionId::new(),
        ));
        assert_eq!(fanout.len(), 4);
        assert_eq!(
            *seen.lock().expect("lock"),
            vec!["a:node_start".to_owned(), "b:node_start".to_owned()]
        );
    }
}
