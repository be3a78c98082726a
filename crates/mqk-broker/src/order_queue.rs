//! Small helper shared by the open/delayed order queues: find-and-remove by
//! order id. The queues are small (bounded by a strategy's outstanding order
//! count, not tick volume) so a linear scan is the right trade-off over a
//! map keyed by order id.

use mqk_schemas::Order;

pub fn take(queue: &mut Vec<Order>, order_id: &str) -> Option<Order> {
    let idx = queue.iter().position(|o| o.order_id == order_id)?;
    Some(queue.remove(idx))
}
