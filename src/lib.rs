pub mod bridge;
pub mod config;
pub mod event;
pub mod finalize;
pub mod flow;
pub mod logging;
pub mod pending;
pub mod qbit;
pub mod render;
pub mod schedule;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod status;
pub mod telegram;
pub mod watcher;

#[cfg(test)]
mod testing;
