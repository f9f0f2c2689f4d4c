pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod store;
