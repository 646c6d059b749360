//! psql-helper library
//!
//! Stores database connection parameters and a password for an alias in a
//! `.env` file, guarding against accidental overwrites.

pub mod cli;
pub mod credentials;
pub mod env_file;
pub mod environment;
pub mod error;
pub mod fib;
pub mod initializer;
pub mod prompt;

// Re-export main types for convenience
pub use credentials::{CredentialSet, Field};
pub use env_file::EnvFile;
pub use environment::Environment;
pub use error::{PsqlHelperError, Result};
pub use fib::fib;
pub use initializer::{
    assert_initialized, assert_initialized_in, initialize, InitMode, InitReport, InitRequest,
};
pub use prompt::{CredentialProvider, FixedPassword, Password, TerminalPrompt};
