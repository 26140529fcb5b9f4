pub mod cache;
pub mod client;
pub mod informer;
pub mod lister;
pub mod watch;
