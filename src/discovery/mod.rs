pub mod registry;

pub use registry::{InstanceRegistry, StaticRegistry};
