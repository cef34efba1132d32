pub mod cicd;
pub mod config;
pub mod control_plane;
pub mod deploy;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod remote;

#[cfg(test)]
mod fakes;

pub use error::{ElestioError, Result};
