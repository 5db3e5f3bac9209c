pub mod config;
pub mod queue;
pub mod retry;

pub use config::DispatcherConfig;
pub use queue::RetryQueue;
pub use retry::RetryPolicy;
