pub mod credential_store;
pub mod error;
pub mod fetcher;
pub mod session;
pub mod view_store;
