#![forbid(unsafe_code)]

pub mod connection;
pub mod delivery;
pub mod router;
pub mod store;



#[cfg(test)]
mod router_tests;

#[cfg(test)]
mod store_tests;
