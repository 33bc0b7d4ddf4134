pub mod allocation;
pub mod pool;

pub use allocation::{Allocation, TicketRange};
pub use pool::{InvariantViolation, Pool};
