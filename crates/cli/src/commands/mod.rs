pub mod cluster;
pub mod metrics;
pub mod workloads;
