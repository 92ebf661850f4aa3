pub mod config;
pub mod feedback;
pub mod issue;
pub mod pr;
pub mod report;
