//! Output formats produced from [`libcif::Node`] outside the library.

pub mod cbor;
pub mod toml;
pub mod yaml;
