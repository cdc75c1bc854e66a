//! Consumers of listener events.

use crate::output::render_event;
use crate::pipeline::types::ListenerEvent;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::{Arc, Mutex};

/// Pluggable handler for [`ListenerEvent`]s.
///
/// Called on the worker thread, so implementations must not block.
pub trait EventSink: Send + 'static {
    fn handle(&mut self, event: &ListenerEvent);

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Renders events to stderr for the interactive CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    quiet: bool,
}

impl ConsoleSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl EventSink for ConsoleSink {
    fn handle(&mut self, event: &ListenerEvent) {
        if self.quiet {
            return;
        }
        render_event(event);
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Records every event. Clones share the same log, so a test can keep one
/// and hand the other to the listener.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    events: Arc<Mutex<Vec<ListenerEvent>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for CollectorSink {
    fn handle(&mut self, event: &ListenerEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Forwards events over a channel without ever waiting for the receiver.
pub struct ChannelSink {
    tx: Sender<ListenerEvent>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: Sender<ListenerEvent>) -> Self {
        Self { tx, dropped: 0 }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &ListenerEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                tracing::debug!(dropped = self.dropped, "event channel full; event discarded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Sends each event to several sinks in order.
pub struct FanOutSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanOutSink {
    fn handle(&mut self, event: &ListenerEvent) {
        for sink in &mut self.sinks {
            sink.handle(event);
        }
    }

    fn name(&self) -> &'static str {
        "fan-out"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn sink_trait_is_object_safe() {
        let _sink: Box<dyn EventSink> = Box::new(CollectorSink::new());
    }

    #[test]
    fn collector_clones_share_events() {
        let collector = CollectorSink::new();
        let mut handed_out = collector.clone();
        handed_out.handle(&ListenerEvent::Listening);
        handed_out.handle(&ListenerEvent::Stopped);
        assert_eq!(
            collector.events(),
            vec![ListenerEvent::Listening, ListenerEvent::Stopped]
        );
    }

    #[test]
    fn channel_sink_never_blocks_when_full() {
        let (tx, rx) = bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.handle(&ListenerEvent::Listening);
        sink.handle(&ListenerEvent::NoSpeech);
        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Listening);
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.dropped, 1);
    }

    #[test]
    fn channel_sink_ignores_closed_receiver() {
        let (tx, rx) = bounded(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        sink.handle(&ListenerEvent::Listening);
        assert_eq!(sink.dropped, 0);
    }

    #[test]
    fn fan_out_delivers_to_every_sink() {
        let a = CollectorSink::new();
        let b = CollectorSink::new();
        let mut fan = FanOutSink::new(vec![Box::new(a.clone()), Box::new(b.clone())]);
        fan.handle(&ListenerEvent::NoSpeech);
        assert_eq!(a.events(), vec![ListenerEvent::NoSpeech]);
        assert_eq!(b.events(), vec![ListenerEvent::NoSpeech]);
    }

    #[test]
    fn quiet_console_sink_is_silent() {
        let mut sink = ConsoleSink::new(true);
        sink.handle(&ListenerEvent::Listening);
        assert_eq!(sink.name(), "console");
    }
}
