//! Locator classification and resource loading.

mod kind;
mod loader;

pub use kind::{classify, ResourceKind};
pub use loader::{LoadedResource, ResourceLoader};
