//! psql-helper - Main entry point

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use psql_helper::cli::{Cli, Commands, InitArgs};
use psql_helper::credentials::{CredentialSet, normalize_alias, password_key};
use psql_helper::env_file;
use psql_helper::{Environment, InitRequest, TerminalPrompt, initialize, initializer};

/// Initialize tracing; `RUST_LOG` overrides the level picked by `-v`
fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_level(true)
                .with_target(false),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    debug!("CLI arguments parsed");

    match cli.command {
        Commands::Init(args) => run_init(&args)?,
        Commands::Check { alias, dir } => run_check(&alias, dir.as_deref())?,
        Commands::Show { alias, dir } => run_show(&alias, dir.as_deref())?,
        Commands::Fib { n } => {
            debug!("Starting crazy calculations...");
            let value = psql_helper::fib(n)?;
            println!("The {}-th Fibonacci number is {}", n, value);
            info!("Script ends here");
        }
    }

    Ok(())
}

/// Run `init`: persist to .env or export into this process
fn run_init(args: &InitArgs) -> Result<()> {
    let credentials = match &args.config {
        Some(path) => {
            info!("Loading credential set from: {:?}", path);
            CredentialSet::load_from_file(path)
                .with_context(|| format!("Failed to load credential set {:?}", path))?
        }
        None => args.credential_set(),
    };

    let env_dir = env_file::resolve_dir(args.dir.as_deref())?;
    let request = InitRequest::new(credentials, env_dir)
        .persist(args.persist)
        .overwrite(args.overwrite);

    // Persist mode reloads the committed file into `env` itself
    let mut env = if args.persist {
        Environment::new()
    } else {
        Environment::layered(&request.env_path())?
    };

    let report = initialize(&request, &mut env, &mut TerminalPrompt::new())
        .with_context(|| format!("Failed to initialize {}", request.credentials.alias))?;

    if let Some(advisory) = report.advisory() {
        println!("{}", advisory);
        // Nothing else runs yet, so the process environment is still ours alone
        env.export();
    }
    if report.file_created {
        println!("File created under {}", report.path.display());
    }
    if let Some(reason) = &report.creation_error {
        println!("Failed creating the file {}: {}", report.path.display(), reason);
    }
    if args.persist {
        println!(
            "✓ {} saved to {}",
            request.credentials.alias,
            report.path.display()
        );
    }

    Ok(())
}

/// Run `check`: exit 1 unless the alias is initialized
fn run_check(alias: &str, dir: Option<&str>) -> Result<()> {
    let alias = normalize_alias(alias);
    let env_dir = env_file::resolve_dir(dir)?;

    match initializer::assert_initialized_in(&alias, &env_dir) {
        Ok(_) => {
            println!("✓ {} is initialized", alias);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

/// Run `show`: list the alias's keys with the password masked
fn run_show(alias: &str, dir: Option<&str>) -> Result<()> {
    let alias = normalize_alias(alias);
    let env_dir = env_file::resolve_dir(dir)?;
    let env = Environment::layered(&env_file::default_path(&env_dir))?;
    let secret = password_key(&alias);

    let mut found = false;
    for (key, value) in env.keys_with_prefix(&alias) {
        found = true;
        if key == secret {
            println!("{}=********", key);
        } else {
            println!("{}={}", key, value);
        }
    }

    if !found {
        eprintln!("No keys found for {}", alias);
        std::process::exit(1);
    }
    Ok(())
}
