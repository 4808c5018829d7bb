pub mod git;
pub mod runner;
pub mod sync;
