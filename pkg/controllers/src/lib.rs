pub mod control;
pub mod daemonset;
pub mod error;
pub mod events;
pub mod queue;

#[cfg(test)]
mod testing;
