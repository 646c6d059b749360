use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::credentials::{
    CredentialSet, DEFAULT_ALIAS, DEFAULT_DBNAME, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USER,
};

/// psql-helper - keep PostgreSQL credentials in a local .env file
#[derive(Parser)]
#[command(name = "psql-helper")]
#[command(about = "Persist database connection parameters and passwords into a .env file")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store connection parameters and a password for an alias
    Init(InitArgs),
    /// Fail unless the alias has a password stored
    Check {
        /// Database alias (e.g. MULTIMODALITY)
        alias: String,
        /// Directory containing .env (default: home directory)
        #[arg(short, long)]
        dir: Option<String>,
    },
    /// Print the stored parameters of an alias (password masked)
    Show {
        /// Database alias (e.g. MULTIMODALITY)
        alias: String,
        /// Directory containing .env (default: home directory)
        #[arg(short, long)]
        dir: Option<String>,
    },
    /// Print the n-th Fibonacci number
    Fib {
        /// n-th Fibonacci number
        #[arg(value_name = "INT")]
        n: u32,
    },
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Database alias, used as the key prefix
    #[arg(short, long, default_value = DEFAULT_ALIAS)]
    pub alias: String,
    /// Database name
    #[arg(long, default_value = DEFAULT_DBNAME)]
    pub dbname: String,
    /// Database host
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,
    /// Database user
    #[arg(short, long, default_value = DEFAULT_USER)]
    pub user: String,
    /// Database port
    #[arg(short, long, default_value = DEFAULT_PORT)]
    pub port: String,
    /// Read the credential set from a JSON file instead of the flags above
    #[arg(short, long, conflicts_with_all = ["alias", "dbname", "host", "user", "port"])]
    pub config: Option<PathBuf>,
    /// Write to the .env file (otherwise values only live in this process)
    #[arg(long)]
    pub persist: bool,
    /// Replace an alias that is already initialized
    #[arg(long)]
    pub overwrite: bool,
    /// Directory containing .env (default: home directory)
    #[arg(short, long)]
    pub dir: Option<String>,
}

impl InitArgs {
    /// Credential set from the flags
    pub fn credential_set(&self) -> CredentialSet {
        CredentialSet::new(
            &self.alias,
            &self.dbname,
            &self.host,
            &self.user,
            &self.port,
        )
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
