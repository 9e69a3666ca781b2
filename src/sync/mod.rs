pub mod alerts;
pub mod cache;
pub mod location;
pub mod poller;
pub mod sources;
