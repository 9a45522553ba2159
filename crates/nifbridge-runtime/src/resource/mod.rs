//! Native resources shared with the managed runtime

pub mod handle;
pub mod registry;

pub use handle::{ResourceGuard, ResourceHandle, ResourceTerm, ResourceType};
pub use registry::{Destructor, ResourceRegistry, RtFlags};
