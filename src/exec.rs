pub mod friction;
pub mod order;
pub mod resolver;

pub use friction::{FrictionModel, MomentumBand, MomentumTracker, SlippageModel, VolumeBand};
pub use order::{ExecutionReport, ExecutionStatus, Order, OrderAction, OrderId, OrderType};
pub use resolver::{OrderLimits, OrderResolver, ResolveCtx};
