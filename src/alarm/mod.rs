pub mod matcher;
pub mod model;
pub mod notifier;
pub mod ring;
pub mod scheduler;
pub mod store;
