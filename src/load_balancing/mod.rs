pub mod balancer;

pub use balancer::{sign_safe_mod, RoundRobinCursor, RoundRobinRouter, RouterStats};
