//! # Broker Discovery
//!
//! Two independent pieces of a messaging platform's operational plumbing:
//!
//! - [`host_usage`]: a sampler that periodically reads CPU, memory and NIC
//!   counters from the OS and publishes utilization snapshots lock-free.
//! - [`load_balancing`] + [`gateway`]: a stateless discovery endpoint that
//!   redirects every inbound request to the next healthy broker, round-robin.
//!
//! The two share no state. The set of live brokers comes from an injected
//! [`discovery::InstanceRegistry`].

/// Error types, configuration and shared data structures
pub mod core;

/// Instance registry abstraction and the in-memory implementation
pub mod discovery;

/// HTTP surface: redirect handler and admin endpoints
pub mod gateway;

/// Host resource usage sampling
pub mod host_usage;

/// Round-robin instance selection
pub mod load_balancing;

/// Logging and metrics setup
pub mod observability;

pub use crate::core::config::ServiceConfig;
pub use crate::core::error::{DiscoveryError, DiscoveryResult};
pub use crate::core::types::{InstanceEndpoint, RequestScheme};
pub use crate::discovery::{InstanceRegistry, StaticRegistry};
pub use crate::gateway::DiscoveryServer;
pub use crate::host_usage::{HostUsageHandle, HostUsageSampler, ResourceSnapshot, ResourceUsage};
pub use crate::load_balancing::RoundRobinRouter;
