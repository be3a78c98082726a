//! Persisted broker state: the resting-order queues only. Account state is
//! plain data owned by the caller and snapshotted separately.
//!
//! The reference implementation persists only the delayed orders' ids
//! (`jsonpickle`-serialized) and reconstructs the order objects from the
//! environment's order cache on restore. This crate has no such external
//! cache, so it snapshots the full order records instead — a self-contained
//! structured blob rather than an id list plus an implicit side channel.

use mqk_schemas::Order;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerState {
    pub open_orders: Vec<Order>,
    pub delayed_orders: Vec<Order>,
}
