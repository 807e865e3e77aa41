use alien_core::Notification;
use crossfire::mpmc;
use crossfire::{MRx, MTx, TryRecvError, TrySendError, detect_backoff_cfg};
use std::sync::Arc;
use tracing::{debug, warn};

/// Announcements travelling from the engine (and the views) to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A region snapshot requested through `SimulationAccess` is prepared.
    DataReadyToRetrieve,
    /// A telemetry sample requested through `SimulationMonitor` is prepared.
    MonitorDataReady,
    /// A view asks the given receivers to refresh.
    Notify(Notification),
}

pub type EventSender = MTx<EngineEvent>;
pub type EventReceiver = MRx<EngineEvent>;
pub type EventSubmit = Arc<dyn Fn(EngineEvent) -> bool + Send + Sync>;

pub fn create_event_bus(capacity: usize) -> (EventSender, EventReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_blocking(capacity.max(1))
}

/// Take every queued event without blocking, in posting order.
pub fn drain_pending_events(receiver: &EventReceiver) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => {
                debug!(?event, "dequeued engine event");
                events.push(event);
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        }
    }
    events
}

pub fn post_event(sender: &EventSender, event: EngineEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(?event, "engine event queue full; dropping event");
            false
        }
        Err(TrySendError::Disconnected(event)) => {
            warn!(?event, "engine event queue disconnected");
            false
        }
    }
}

pub fn make_event_submit(sender: EventSender) -> EventSubmit {
    let sender = Arc::new(sender);
    Arc::new(move |event: EngineEvent| post_event(&sender, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alien_core::{Receiver, UpdateDescription};

    #[test]
    fn events_drain_in_posting_order() {
        let (sender, receiver) = create_event_bus(4);
        let submit = make_event_submit(sender.clone());
        assert!(post_event(&sender, EngineEvent::MonitorDataReady));
        let note = Notification::new([Receiver::Simulation], UpdateDescription::All);
        assert!(submit(EngineEvent::Notify(note.clone())));
        assert!(post_event(&sender, EngineEvent::DataReadyToRetrieve));

        let events = drain_pending_events(&receiver);
        assert_eq!(
            events,
            vec![
                EngineEvent::MonitorDataReady,
                EngineEvent::Notify(note),
                EngineEvent::DataReadyToRetrieve,
            ]
        );
        assert!(drain_pending_events(&receiver).is_empty());
    }

    #[test]
    fn full_queue_drops_events() {
        let (sender, receiver) = create_event_bus(1);
        assert!(post_event(&sender, EngineEvent::MonitorDataReady));
        assert!(!post_event(&sender, EngineEvent::DataReadyToRetrieve));
        assert_eq!(drain_pending_events(&receiver).len(), 1);
    }
}
