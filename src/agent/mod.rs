pub mod error;
pub mod intent;
pub mod recovery;
pub mod runner;
pub mod runtime;
pub mod step;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use runtime::AgentRuntime;
