pub mod entity;
pub mod filter;
pub mod http;
pub mod metric_data;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod session;
pub mod transport;

pub use entity::{AllApplicationTypes, EntityRecord};
pub use filter::FilterSet;
pub use http::HttpTransport;
pub use metric_data::{MetricDataPoint, MetricValueSample};
pub use session::{ControllerSession, SessionState};
pub use transport::{ControllerRequest, ControllerResponse, ControllerTransport};
