pub mod artifact;
pub mod generated;
pub mod job;
pub mod queue;
