#![deny(clippy::await_holding_refcell_ref)]

pub mod client;
pub mod common;
pub mod provision;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::ProvisionerError;
pub type Result<T> = std::result::Result<T, Error>;

pub const PROVISIONER_VERSION: &str = {
    match option_env!("PROVISIONER_BUILD_VERSION") {
        Some(version) => version,
        None => env!("CARGO_PKG_VERSION"),
    }
};
