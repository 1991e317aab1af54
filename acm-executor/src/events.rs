//! Event emission boundary (spec.md §6.4). The executor has no transport
//! opinion: it only produces `TimelineEvent`s and hands them to whatever
//! `EventSink` the caller supplies.

use acm_contracts::TimelineEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Where the executor sends `TimelineEvent`s as phases progress. Sending is
/// fire-and-forget: a sink that errors or drops events must never affect
/// run outcomes, mirroring `acm_generators::adapter::send_progress`'s
/// best-effort contract for progress messages.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TimelineEvent);
}

/// An `EventSink` that forwards onto an unbounded channel, for callers that
/// want to subscribe to a run's timeline (e.g. to stream it out over an API
/// the core itself does not implement).
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<TimelineEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TimelineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: TimelineEvent) {
        let _ = self.sender.send(event);
    }
}

/// Discards every event. Useful for tests that don't care about the
/// timeline, and as a safe default.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: TimelineEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_contracts::{Phase, RunId};

    #[test]
    fn channel_sink_forwards_emitted_events() {
        let (sink, mut receiver) = ChannelEventSink::new();
        sink.emit(TimelineEvent::new(RunId::new(), Phase::Initialization, "run.started", true));
        assert!(receiver.try_recv().is_ok());
    }
}
