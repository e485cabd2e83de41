mod estimator;
pub use estimator::{EndpointTable, Latency, LatencyEstimator};

mod session;
pub use session::*;
