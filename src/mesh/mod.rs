//! Service-mesh configuration: typed objects, categories, aggregation and
//! route switching.

mod aggregator;
mod category;
pub mod objects;
pub mod routing;

pub use aggregator::{ConfigAggregator, ConfigSource, IstioConfigList};
pub use category::{Category, ConfigCriteria};
pub use objects::{ConfigObject, MeshResource};
pub use routing::{RouteSwitch, VERSION_LABEL, route_all_traffic};
