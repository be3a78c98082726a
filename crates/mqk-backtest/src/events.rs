//! Typed event bus. Every stage of a simulated trading day publishes onto
//! it; listeners subscribe to the events they care about and run in
//! registration order. Mirrors the reference implementation's named bus
//! events (`BEFORE_TRADING`, `BAR`, `AFTER_TRADING`, `ORDER_*`, `TRADE`) —
//! ticks have no dedicated event because this is a bar-based simulation.

use mqk_broker::BrokerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    BeforeTrading,
    Bar,
    AfterTrading,
    Settlement,
    OrderPendingNew,
    OrderCreationPass,
    OrderCreationReject,
    OrderPendingCancel,
    OrderCancellationPass,
    OrderCancellationReject,
    OrderUnsolicitedUpdate,
    Trade,
}

#[derive(Debug, Clone)]
pub enum Event {
    BeforeTrading,
    Bar,
    AfterTrading,
    Settlement,
    Broker(BrokerEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BeforeTrading => EventKind::BeforeTrading,
            Event::Bar => EventKind::Bar,
            Event::AfterTrading => EventKind::AfterTrading,
            Event::Settlement => EventKind::Settlement,
            Event::Broker(BrokerEvent::OrderPendingNew(_)) => EventKind::OrderPendingNew,
            Event::Broker(BrokerEvent::OrderCreationPass(_)) => EventKind::OrderCreationPass,
            Event::Broker(BrokerEvent::OrderCreationReject(_)) => EventKind::OrderCreationReject,
            Event::Broker(BrokerEvent::OrderPendingCancel(_)) => EventKind::OrderPendingCancel,
            Event::Broker(BrokerEvent::OrderCancellationPass(_)) => EventKind::OrderCancellationPass,
            Event::Broker(BrokerEvent::OrderCancellationReject(_)) => EventKind::OrderCancellationReject,
            Event::Broker(BrokerEvent::OrderUnsolicitedUpdate(_)) => EventKind::OrderUnsolicitedUpdate,
            Event::Broker(BrokerEvent::Trade(_)) => EventKind::Trade,
        }
    }
}

type Listener = Box<dyn FnMut(&Event) + Send>;

/// Ordered, per-event-kind listener registry. `publish` is the only way
/// listeners observe simulation progress — there is no shared mutable state
/// to poll instead.
#[derive(Default)]
pub struct EventBus {
    listeners: std::collections::BTreeMap<EventKind, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    pub fn publish(&mut self, event: Event) {
        if let Some(listeners) = self.listeners.get_mut(&event.kind()) {
            for listener in listeners.iter_mut() {
                listener(&event);
            }
        }
    }

    pub fn publish_all(&mut self, events: impl IntoIterator<Item = BrokerEvent>) {
        for e in events {
            self.publish(Event::Broker(e));
        }
    }
}
