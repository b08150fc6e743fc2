pub mod anomaly;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod server;
pub mod sinks;
pub mod transform;

#[cfg(test)]
mod testing;
