//! Offline cache manager: request classification, lifecycle and fetch routing.

mod classify;
mod lifecycle;
mod manager;
mod policy;

pub use classify::RequestClass;
pub use manager::{ActivateReport, InstallReport, OfflineCacheManager};
pub use policy::CachePolicy;
