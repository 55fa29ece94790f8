pub mod btle;
pub mod connection;
pub mod constants;
pub mod controller;
pub mod platform;
pub mod registry;
pub mod session;
pub mod status;
pub mod timer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
