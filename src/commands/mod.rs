pub mod git;
pub mod github;
#[cfg(feature = "desktop")]
pub mod ipc;
pub mod pipeline;
pub mod settings;
pub mod store;
