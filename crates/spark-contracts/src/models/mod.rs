mod registry;
mod selectors;

pub use registry::{Capability, ModelRegistry, ModelSpec, SDXL_VERSION};
pub use selectors::{ModelSelection, ModelSelector};
