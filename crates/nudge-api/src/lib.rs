pub mod client;
pub mod snapshot;
pub mod token;
