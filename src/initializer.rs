//! Credential initialization.
//!
//! Materializes a [`CredentialSet`] plus a prompted password either into the
//! env file (persist mode) or into an in-memory [`Environment`] (transient
//! mode).
//!
//! # Invariants
//!
//! - An alias counts as initialized iff `{ALIAS}_PASSWORD` is present.
//! - Without `overwrite`, an initialized alias is never touched: the call
//!   fails before prompting and the file stays byte-for-byte identical.
//! - All five keys go to disk in one commit, after the password has been
//!   obtained. A cancelled prompt leaves the file as it was.
//! - Lines for other keys are preserved; each alias key ends up on exactly
//!   one line.
//!
//! # Failure Modes
//!
//! - Env file cannot be created: logged and recorded in the report, the call
//!   carries on and the commit surfaces the real IO error.
//! - Env file cannot be read: `EnvFile` error, nothing written. Lines that
//!   do not parse are skipped when reading values and kept verbatim when
//!   writing.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::credentials::{password_key, CredentialSet};
use crate::env_file::{self, EnvFile};
use crate::environment::Environment;
use crate::error::{PsqlHelperError, Result};
use crate::prompt::CredentialProvider;

/// Advisory shown when values only live in the current process
pub const TRANSIENT_ADVISORY: &str =
    "Env vars will not persist after this process exits. Consider --persist.";

/// What to initialize and how
#[derive(Debug, Clone)]
pub struct InitRequest {
    pub credentials: CredentialSet,
    /// Write to the env file instead of the in-memory environment only
    pub persist: bool,
    /// Replace an alias that is already initialized
    pub overwrite: bool,
    /// Directory holding `.env`
    pub env_dir: PathBuf,
}

impl InitRequest {
    pub fn new(credentials: CredentialSet, env_dir: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            persist: false,
            overwrite: false,
            env_dir: env_dir.into(),
        }
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Full path of the env file
    pub fn env_path(&self) -> PathBuf {
        env_file::default_path(&self.env_dir)
    }
}

/// Where the values ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    Persisted,
    Transient,
}

/// Outcome of a successful [`initialize`]
#[derive(Debug, Clone)]
pub struct InitReport {
    pub mode: InitMode,
    /// Env file path (written only in persist mode)
    pub path: PathBuf,
    /// The env file did not exist and was created
    pub file_created: bool,
    /// Creating the env file failed; the message is kept for the caller
    pub creation_error: Option<String>,
    /// Keys written, password key last
    pub keys: Vec<String>,
}

impl InitReport {
    /// Status line for the terminal, if any
    pub fn advisory(&self) -> Option<&'static str> {
        match self.mode {
            InitMode::Transient => Some(TRANSIENT_ADVISORY),
            InitMode::Persisted => None,
        }
    }
}

/// Initialize the credential set described by `request`.
///
/// In persist mode `env` is replaced by the freshly committed file contents.
/// In transient mode the five keys are set on `env` and nothing else changes.
pub fn initialize(
    request: &InitRequest,
    env: &mut Environment,
    provider: &mut dyn CredentialProvider,
) -> Result<InitReport> {
    request.credentials.validate()?;

    if request.persist {
        initialize_persistent(request, env, provider)
    } else {
        initialize_transient(request, env, provider)
    }
}

fn initialize_transient(
    request: &InitRequest,
    env: &mut Environment,
    provider: &mut dyn CredentialProvider,
) -> Result<InitReport> {
    let creds = &request.credentials;
    warn!(alias = %creds.alias, "{}", TRANSIENT_ADVISORY);

    guard(&creds.alias, is_initialized(&creds.alias, env), request.overwrite)?;

    let password_key = creds.password_key();
    let password = provider.password(&password_key)?;
    check_password(&password_key, password.expose())?;

    for (key, value) in creds.to_env_vars() {
        env.set(key, value);
    }
    env.set(password_key, password.expose());

    info!(alias = %creds.alias, "Credentials set for this process");
    Ok(InitReport {
        mode: InitMode::Transient,
        path: request.env_path(),
        file_created: false,
        creation_error: None,
        keys: creds.keys(),
    })
}

fn initialize_persistent(
    request: &InitRequest,
    env: &mut Environment,
    provider: &mut dyn CredentialProvider,
) -> Result<InitReport> {
    let creds = &request.credentials;
    let path = request.env_path();

    let (file_created, creation_error) = match env_file::ensure_exists(&path) {
        Ok(true) => {
            info!(path = %path.display(), "Env file created");
            (true, None)
        }
        Ok(false) => (false, None),
        Err(e) => {
            error!(path = %path.display(), "Failed creating the env file: {}", e);
            (false, Some(e.to_string()))
        }
    };

    let mut document = EnvFile::open(&path)?;
    let password_key = creds.password_key();

    // A password line dotenvy could not parse still counts
    let loaded = Environment::load(&path)?;
    let initialized =
        is_initialized(&creds.alias, &loaded) || document.contains_key(&password_key);
    guard(&creds.alias, initialized, request.overwrite)?;

    let password = provider.password(&password_key)?;
    check_password(&password_key, password.expose())?;

    for (key, value) in creds.to_env_vars() {
        debug!(key = %key, "Writing key");
        document.upsert(&key, &value)?;
    }
    document.upsert(&password_key, password.expose())?;
    drop(password);

    document.commit()?;
    *env = Environment::load(&path)?;

    info!(alias = %creds.alias, path = %path.display(), "Credentials saved");
    Ok(InitReport {
        mode: InitMode::Persisted,
        path,
        file_created,
        creation_error,
        keys: creds.keys(),
    })
}

/// Fail unless `{alias}_PASSWORD` is present in `env`.
pub fn assert_initialized(alias: &str, env: &Environment) -> Result<()> {
    if is_initialized(alias, env) {
        Ok(())
    } else {
        Err(PsqlHelperError::not_initialized(alias))
    }
}

/// Whether `{alias}_PASSWORD` is present in `env`
pub fn is_initialized(alias: &str, env: &Environment) -> bool {
    env.contains(&password_key(alias))
}

/// Load the env file in `dir` and check the alias is initialized there
pub fn assert_initialized_in(alias: &str, dir: &Path) -> Result<Environment> {
    let env = Environment::layered(&env_file::default_path(dir))?;
    assert_initialized(alias, &env)?;
    Ok(env)
}

fn guard(alias: &str, initialized: bool, overwrite: bool) -> Result<()> {
    if !initialized {
        return Ok(());
    }
    if overwrite {
        info!(alias, "Alias already initialized, overwriting");
        Ok(())
    } else {
        Err(PsqlHelperError::already_initialized(alias))
    }
}

fn check_password(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(PsqlHelperError::validation(format!(
            "{} must not be empty",
            key
        )));
    }
    crate::credentials::validate_value(key, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{FixedPassword, Password};
    use std::fs;
    use tempfile::TempDir;

    /// Fails the test if the initializer asks for a password
    struct NoPrompt;

    impl CredentialProvider for NoPrompt {
        fn password(&mut self, key: &str) -> Result<Password> {
            panic!("unexpected password prompt for {}", key);
        }
    }

    fn request(dir: &TempDir) -> InitRequest {
        InitRequest::new(CredentialSet::new("TESTDB", "x", "h", "u", "5432"), dir.path())
    }

    #[test]
    fn test_persist_into_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut env = Environment::new();
        let report = initialize(
            &request(&dir).persist(true),
            &mut env,
            &mut FixedPassword::new("secret"),
        )
        .unwrap();

        assert_eq!(report.mode, InitMode::Persisted);
        assert!(report.file_created);
        assert!(report.creation_error.is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join(".env")).unwrap(),
            "TESTDB_DBNAME=x\nTESTDB_HOST=h\nTESTDB_USER=u\nTESTDB_PORT=5432\nTESTDB_PASSWORD=secret\n"
        );
        assert_eq!(env.get("TESTDB_PASSWORD"), Some("secret"));
        assert_eq!(env.len(), 5);
    }

    #[test]
    fn test_guard_rejects_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "TESTDB_PASSWORD=old\nTESTDB_HOST=old\n").unwrap();

        let err = initialize(&request(&dir).persist(true), &mut Environment::new(), &mut NoPrompt)
            .unwrap_err();

        assert!(matches!(err, PsqlHelperError::AlreadyInitialized { ref alias } if alias == "TESTDB"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "TESTDB_PASSWORD=old\nTESTDB_HOST=old\n"
        );
    }

    #[test]
    fn test_overwrite_replaces_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "TESTDB_PASSWORD=old\nTESTDB_HOST=old\n").unwrap();

        let mut env = Environment::new();
        initialize(
            &request(&dir).persist(true).overwrite(true),
            &mut env,
            &mut FixedPassword::new("new"),
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "TESTDB_PASSWORD=new\nTESTDB_HOST=h\nTESTDB_DBNAME=x\nTESTDB_USER=u\nTESTDB_PORT=5432\n"
        );
        assert_eq!(env.get("TESTDB_HOST"), Some("h"));
    }

    #[test]
    fn test_cancelled_prompt_writes_nothing() {
        struct Cancel;
        impl CredentialProvider for Cancel {
            fn password(&mut self, _key: &str) -> Result<Password> {
                Err(PsqlHelperError::prompt("cancelled"))
            }
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "OTHER=1\n").unwrap();

        let result = initialize(&request(&dir).persist(true), &mut Environment::new(), &mut Cancel);
        assert!(matches!(result, Err(PsqlHelperError::Prompt(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "OTHER=1\n");
    }

    #[test]
    fn test_empty_password_rejected() {
        let dir = TempDir::new().unwrap();
        let result = initialize(
            &request(&dir).persist(true),
            &mut Environment::new(),
            &mut FixedPassword::new(""),
        );
        assert!(matches!(result, Err(PsqlHelperError::Validation(_))));
        assert_eq!(fs::read_to_string(dir.path().join(".env")).unwrap(), "");
    }

    #[test]
    fn test_invalid_credentials_fail_before_any_io() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir).persist(true);
        req.credentials.port = "not-a-port".to_string();

        let result = initialize(&req, &mut Environment::new(), &mut NoPrompt);
        assert!(matches!(result, Err(PsqlHelperError::Validation(_))));
        assert!(!dir.path().join(".env").exists());
    }

    #[test]
    fn test_creation_failure_is_reported_then_commit_fails() {
        let dir = TempDir::new().unwrap();
        let req = InitRequest::new(
            CredentialSet::new("TESTDB", "x", "h", "u", "5432"),
            dir.path().join("missing"),
        )
        .persist(true);

        let result = initialize(&req, &mut Environment::new(), &mut FixedPassword::new("pw"));
        assert!(matches!(result, Err(PsqlHelperError::Io(_))));
    }

    #[test]
    fn test_transient_sets_env_only() {
        let dir = TempDir::new().unwrap();
        let mut env = Environment::new();
        let report = initialize(&request(&dir), &mut env, &mut FixedPassword::new("secret")).unwrap();

        assert_eq!(report.mode, InitMode::Transient);
        assert_eq!(report.advisory(), Some(TRANSIENT_ADVISORY));
        assert!(!dir.path().join(".env").exists());
        for key in ["TESTDB_DBNAME", "TESTDB_HOST", "TESTDB_USER", "TESTDB_PORT"] {
            assert!(env.contains(key), "{} missing", key);
        }
        assert_eq!(env.get("TESTDB_PASSWORD"), Some("secret"));
    }

    #[test]
    fn test_unparseable_lines_do_not_block_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let original = "GREETING=hello world\nSOMEFLAG\nOTHER=1\n";
        fs::write(&path, original).unwrap();

        let mut env = Environment::new();
        initialize(
            &request(&dir).persist(true),
            &mut env,
            &mut FixedPassword::new("secret"),
        )
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(original), "{:?}", content);
        assert!(content.ends_with("TESTDB_PASSWORD=secret\n"));
        assert_eq!(env.get("OTHER"), Some("1"));
        assert_eq!(env.get("TESTDB_PASSWORD"), Some("secret"));
    }

    #[test]
    fn test_unparseable_password_line_still_guards() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "TESTDB_PASSWORD=two words\n").unwrap();

        let result = initialize(&request(&dir).persist(true), &mut Environment::new(), &mut NoPrompt);
        assert!(matches!(result, Err(PsqlHelperError::AlreadyInitialized { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "TESTDB_PASSWORD=two words\n");
    }

    #[test]
    fn test_transient_guard() {
        let dir = TempDir::new().unwrap();
        let mut env = Environment::new();
        env.set("TESTDB_PASSWORD", "old");

        let result = initialize(&request(&dir), &mut env, &mut NoPrompt);
        assert!(matches!(result, Err(PsqlHelperError::AlreadyInitialized { .. })));
        assert_eq!(env.get("TESTDB_PASSWORD"), Some("old"));

        initialize(&request(&dir).overwrite(true), &mut env, &mut FixedPassword::new("new")).unwrap();
        assert_eq!(env.get("TESTDB_PASSWORD"), Some("new"));
    }

    #[test]
    fn test_assert_initialized() {
        let mut env = Environment::new();
        let err = assert_initialized("TESTDB", &env).unwrap_err();
        assert!(matches!(err, PsqlHelperError::NotInitialized { ref alias } if alias == "TESTDB"));

        env.set("TESTDB_PASSWORD", "pw");
        assert!(assert_initialized("TESTDB", &env).is_ok());
        assert!(assert_initialized("OTHER", &env).is_err());
    }
}
