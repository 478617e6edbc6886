pub mod notifier;
pub mod repo;
pub mod transport;
