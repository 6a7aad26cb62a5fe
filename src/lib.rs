//! Generates ninja build files for a single native executable
//! from a declarative `build.toml` description.

/// Toolchain flag syntax and installed toolchain discovery.
pub mod toolchain {
    pub mod locator;
    pub mod profile;

    mod resolve;
    pub use resolve::Toolchain;
}

pub mod cmake;
pub mod data;
pub mod ninja;
pub mod script;
pub mod target;
