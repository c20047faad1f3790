pub mod connection;
pub mod handle;
pub mod notify;
pub mod presence;
pub mod router;
