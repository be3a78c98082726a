//! Events the broker emits for the caller to publish onto its own bus.
//!
//! The broker has no bus of its own — publishing is the backtest driver's
//! job — so every mutating method here returns the events it would have
//! published, in emission order, instead of depending on a bus type defined
//! upstream of this crate.

use mqk_schemas::{Order, Trade};

#[derive(Debug, Clone)]
pub enum BrokerEvent {
    OrderPendingNew(Order),
    OrderCreationPass(Order),
    OrderCreationReject(Order),
    OrderPendingCancel(Order),
    OrderCancellationPass(Order),
    OrderCancellationReject(Order),
    OrderUnsolicitedUpdate(Order),
    Trade(Trade),
}
