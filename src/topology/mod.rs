mod correlator;
mod selector;

pub use correlator::{
    DeploymentSummary, PodSummary, ServiceSummary, TopologyService, WorkloadSource,
    filter_deployments_for_service, filter_pods_for_selector, filter_pods_for_service,
};
pub use selector::{LabelSelector, Operator, Requirement, SelectorError};
