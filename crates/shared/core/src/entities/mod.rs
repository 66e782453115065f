mod contract;
mod order;
mod order_type;
mod side;
mod time_in_force;

pub use contract::{Contract, InstrumentKey, OptionRight, SecType};
pub use order::{Order, Trail, TriggerMethod};
pub use order_type::OrderType;
pub use side::Side;
pub use time_in_force::TimeInForce;
