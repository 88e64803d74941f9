pub mod binder;
pub mod collector;
pub mod executor;
pub mod poller;
pub mod resolver;

pub use binder::{LabeledValue, bind};
pub use collector::{Collector, GaugeBinding};
pub use executor::{BoundedExecutor, ConcurrencyCap};
pub use poller::{Poller, SleepPlan, StopReason, plan_sleep};
pub use resolver::ControllerApplications;
