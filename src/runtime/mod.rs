//! Runtime abstraction for process-level operations.
//!
//! Configuration loading and the CLI read the environment and files through
//! [`Runtime`] so they can be exercised with a mock in tests.
//!
//! # Structure
//!
//! - `env` - Environment variables
//! - `fs` - File reads

mod env;
mod fs;

use anyhow::Result;
use std::env as std_env;
use std::path::Path;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;

    // File System
    fn read_to_string(&self, path: &Path) -> Result<String>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.read_to_string_impl(path)
    }
}
