pub mod error;
pub mod time;
pub mod types;

pub use error::{AppdError, Result};
pub use time::TimeWindow;
pub use types::{ApplicationFilter, ControllerConfig, EntityType, SAAS_HOST_SUFFIX};
