//! Runtime module — process lifecycle: boot and shutdown.

pub mod boot;
pub mod stop;
