pub mod checks;
pub mod events;
pub mod plan;
pub mod policy;
pub mod runs;
