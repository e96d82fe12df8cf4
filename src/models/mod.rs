pub mod order;
pub mod ticket;

pub use order::{Order, OrderStatus};
pub use ticket::{Category, Ticket};
