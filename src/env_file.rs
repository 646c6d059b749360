//! The persisted `.env` document.
//!
//! Lines are kept verbatim, terminators included, so that an edit only touches
//! the lines of the keys being written. Comments, blank lines, CRLF endings and
//! entries for other aliases survive a commit byte-for-byte.
//!
//! # Format
//!
//! One `KEY=VALUE` per line, optionally prefixed with `export`. Values made of
//! safe characters are written bare; anything else is double-quoted with `\`,
//! `"` and `$` escaped, which is what `dotenvy` expects when reading back.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{PsqlHelperError, Result};

/// File name of the env file inside its directory
pub const ENV_FILE_NAME: &str = ".env";

/// One entry or passthrough line, line terminator included
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// `KEY=VALUE`; a quoted value may span several physical lines
    Entry { key: String, text: String },
    Other(String),
}

impl Line {
    fn text(&self) -> &str {
        match self {
            Line::Entry { text, .. } | Line::Other(text) => text,
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            Line::Entry { key, .. } => Some(key),
            Line::Other(_) => None,
        }
    }
}

/// Quoting state carried from one physical line to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Closed,
    Double,
    Single,
}

/// An env file loaded for editing
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<Line>,
    /// Terminator used for appended lines, follows the file
    newline: &'static str,
}

impl EnvFile {
    /// Read the file at `path`. A missing file is an empty document.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self::parse(path, &content))
    }

    /// Build a document from text without touching the disk.
    ///
    /// Physical lines inside an unterminated quoted value belong to the entry
    /// that opened the quote, the same way `dotenvy` reads them.
    pub fn parse(path: PathBuf, content: &str) -> Self {
        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let mut lines = Vec::new();
        let mut open: Option<(String, String, Quote)> = None;

        for physical in content.split_inclusive('\n') {
            if let Some((key, mut text, quote)) = open.take() {
                text.push_str(physical);
                match scan_quotes(strip_newline(physical), quote) {
                    Quote::Closed => lines.push(Line::Entry { key, text }),
                    quote => open = Some((key, text, quote)),
                }
                continue;
            }

            let Some(key) = parse_key(physical) else {
                lines.push(Line::Other(physical.to_string()));
                continue;
            };
            let key = key.to_string();
            let text = physical.to_string();
            let value = physical.split_once('=').map_or("", |(_, v)| v);
            match scan_quotes(strip_newline(value), Quote::Closed) {
                Quote::Closed => lines.push(Line::Entry { key, text }),
                quote => open = Some((key, text, quote)),
            }
        }

        // Unterminated quote at end of file: keep it as one entry
        if let Some((key, text, _)) = open {
            lines.push(Line::Entry { key, text });
        }

        Self {
            path,
            lines,
            newline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether any entry line defines `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.lines.iter().any(|l| l.key() == Some(key))
    }

    /// Keys in file order, duplicates included
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(Line::key)
    }

    /// Replace the value of `key`, or append it if absent.
    ///
    /// Later duplicate lines for the same key are dropped so the document
    /// holds exactly one line per key afterwards. A replaced line keeps its
    /// terminator; an appended line follows the file's line ending, and a
    /// file without a final newline stays without one.
    pub fn upsert(&mut self, key: &str, value: &str) -> Result<()> {
        if parse_key(&format!("{}=", key)) != Some(key) {
            return Err(PsqlHelperError::validation(format!(
                "'{}' is not a valid env key",
                key
            )));
        }
        crate::credentials::validate_value(key, value)?;

        let entry = format!("{}={}", key, format_value(value));
        let mut seen = false;
        self.lines.retain_mut(|line| {
            if line.key() != Some(key) {
                return true;
            }
            if seen {
                return false;
            }
            seen = true;
            let terminator = line_terminator(line.text());
            *line = Line::Entry {
                key: key.to_string(),
                text: format!("{}{}", entry, terminator),
            };
            true
        });

        if !seen {
            let newline = self.newline;
            let text = match self.lines.last_mut() {
                Some(Line::Entry { text: last, .. } | Line::Other(last))
                    if line_terminator(last).is_empty() =>
                {
                    last.push_str(newline);
                    entry
                }
                _ => format!("{}{}", entry, newline),
            };
            self.lines.push(Line::Entry {
                key: key.to_string(),
                text,
            });
        }
        Ok(())
    }

    /// Document text as it will be written
    pub fn render(&self) -> String {
        self.lines.iter().map(Line::text).collect()
    }

    /// Write the document back to its path.
    ///
    /// The text goes to a sibling temp file first and is renamed over the
    /// target, so readers never see a half-written file. An existing file
    /// keeps its permissions; a new one is created 0600.
    pub fn commit(&self) -> Result<()> {
        let tmp = temp_path(&self.path);
        {
            let mut file = create_private(&tmp, false)?;
            file.write_all(self.render().as_bytes())?;
            file.sync_all()?;
        }

        if let Ok(meta) = fs::metadata(&self.path) {
            fs::set_permissions(&tmp, meta.permissions())?;
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::debug!(path = %self.path.display(), lines = self.lines.len(), "Env file committed");
        Ok(())
    }
}

/// Create an empty env file at `path` if there is none.
///
/// Returns `true` when the file was created by this call.
pub fn ensure_exists(path: &Path) -> io::Result<bool> {
    match create_private(path, true) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// `{dir}/.env`
pub fn default_path(dir: &Path) -> PathBuf {
    dir.join(ENV_FILE_NAME)
}

/// Directory holding the env file: `dir` with `~` expanded, or the home directory
pub fn resolve_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).as_ref())),
        None => dirs::home_dir()
            .ok_or_else(|| PsqlHelperError::config("Could not determine the home directory")),
    }
}

/// Extract the key of a `KEY=VALUE` line, if it is one
fn parse_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = match line.strip_prefix("export") {
        Some(rest) if rest.starts_with([' ', '\t']) => rest.trim_start(),
        _ => line,
    };
    let (key, _) = line.split_once('=')?;
    let key = key.trim();

    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    valid.then_some(key)
}

/// Follow quotes through `text`, starting in state `quote`
fn scan_quotes(text: &str, mut quote: Quote) -> Quote {
    let mut after_space = true;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match quote {
            Quote::Closed => match c {
                '#' if after_space => return Quote::Closed,
                '\\' => {
                    chars.next();
                }
                '"' => quote = Quote::Double,
                '\'' => quote = Quote::Single,
                _ => {}
            },
            Quote::Double => match c {
                '\\' => {
                    chars.next();
                }
                '"' => quote = Quote::Closed,
                _ => {}
            },
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::Closed;
                }
            }
        }
        after_space = c.is_whitespace();
    }
    quote
}

fn strip_newline(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// `"\r\n"`, `"\n"` or `""` for the last line of a file without a final newline
fn line_terminator(text: &str) -> &'static str {
    if text.ends_with("\r\n") {
        "\r\n"
    } else if text.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

fn format_value(value: &str) -> String {
    let bare = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_-./:@%+,".contains(c));
    if bare {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| ENV_FILE_NAME.into());
    name.push(".psql-helper.tmp");
    path.with_file_name(name)
}

fn create_private(path: &Path, create_new: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    #[cfg(unix)]
    options.mode(0o600);
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(content: &str) -> EnvFile {
        EnvFile::parse(PathBuf::from("/tmp/.env"), content)
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("FOO=bar"), Some("FOO"));
        assert_eq!(parse_key("export FOO=bar"), Some("FOO"));
        assert_eq!(parse_key("export\tFOO=bar"), Some("FOO"));
        assert_eq!(parse_key("exporter=1"), Some("exporter"));
        assert_eq!(parse_key("FOO=bar\r\n"), Some("FOO"));
        assert_eq!(parse_key("  FOO = bar"), Some("FOO"));
        assert_eq!(parse_key("FOO="), Some("FOO"));
        assert_eq!(parse_key("# FOO=bar"), None);
        assert_eq!(parse_key(""), None);
        assert_eq!(parse_key("no separator"), None);
        assert_eq!(parse_key("BAD KEY=x"), None);
    }

    #[test]
    fn test_upsert_appends_missing_key() {
        let mut env = doc("A=1\n");
        env.upsert("B", "2").unwrap();
        assert_eq!(env.render(), "A=1\nB=2\n");
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut env = doc("A=1\nB=2\nC=3\n");
        env.upsert("B", "20").unwrap();
        assert_eq!(env.render(), "A=1\nB=20\nC=3\n");
    }

    #[test]
    fn test_upsert_collapses_duplicates() {
        let mut env = doc("A=1\nB=2\nA=3\n# note\nA=4\n");
        env.upsert("A", "9").unwrap();
        assert_eq!(env.render(), "A=9\nB=2\n# note\n");
    }

    #[test]
    fn test_upsert_replaces_exported_key() {
        let mut env = doc("export A=1\n");
        env.upsert("A", "2").unwrap();
        assert_eq!(env.render(), "A=2\n");
    }

    #[test]
    fn test_upsert_preserves_comments_and_blanks() {
        let mut env = doc("# header\n\nOTHER_HOST=x\n");
        env.upsert("DB_HOST", "h").unwrap();
        assert_eq!(env.render(), "# header\n\nOTHER_HOST=x\nDB_HOST=h\n");
    }

    #[test]
    fn test_upsert_keeps_crlf_and_missing_final_newline() {
        let mut env = doc("OTHER_HOST=a\r\nOTHER_PASSWORD=b");
        env.upsert("DB_HOST", "h").unwrap();
        env.upsert("DB_PORT", "5432").unwrap();
        assert_eq!(
            env.render(),
            "OTHER_HOST=a\r\nOTHER_PASSWORD=b\r\nDB_HOST=h\r\nDB_PORT=5432"
        );
    }

    #[test]
    fn test_upsert_replace_keeps_line_terminator() {
        let mut env = doc("A=1\r\nB=2\r\nC=3");
        env.upsert("A", "9").unwrap();
        env.upsert("C", "8").unwrap();
        assert_eq!(env.render(), "A=9\r\nB=2\r\nC=8");
    }

    #[test]
    fn test_unchanged_document_renders_verbatim() {
        let content = "# db\r\nexport\tA=1\r\n\r\nCERT=\"x\ny\"\nB='q'";
        assert_eq!(doc(content).render(), content);
    }

    #[test]
    fn test_upsert_replaces_tab_exported_key() {
        let mut env = doc("export\tDB_HOST=old\n");
        assert!(env.contains_key("DB_HOST"));
        env.upsert("DB_HOST", "h").unwrap();
        assert_eq!(env.render(), "DB_HOST=h\n");
    }

    #[test]
    fn test_multiline_value_lines_are_not_entries() {
        let content = "CERT=\"line1\nDB_HOST=inside\nend\"\nOTHER=1\n";
        let mut env = doc(content);
        assert_eq!(env.keys().collect::<Vec<_>>(), vec!["CERT", "OTHER"]);

        env.upsert("DB_HOST", "h").unwrap();
        assert_eq!(env.render(), format!("{}DB_HOST=h\n", content));
    }

    #[test]
    fn test_replacing_multiline_entry_replaces_all_its_lines() {
        let mut env = doc("KEY='a\nb'\nNEXT=1\n");
        env.upsert("KEY", "c").unwrap();
        assert_eq!(env.render(), "KEY=c\nNEXT=1\n");
    }

    #[test]
    fn test_quote_after_comment_does_not_open() {
        let env = doc("A=1 # it's fine\nB=2\n");
        assert_eq!(env.keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_upsert_rejects_bad_key() {
        let mut env = doc("");
        assert!(env.upsert("BAD KEY", "x").is_err());
        assert!(env.upsert("", "x").is_err());
    }

    #[test]
    fn test_upsert_rejects_line_break() {
        let mut env = doc("");
        assert!(env.upsert("A", "one\ntwo").is_err());
        assert_eq!(env.render(), "");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value("id-hdb-psgr-ct17.ethz.ch"), "id-hdb-psgr-ct17.ethz.ch");
        assert_eq!(format_value(""), "");
        assert_eq!(format_value("p w"), "\"p w\"");
        assert_eq!(format_value("a\"b$c\\d"), "\"a\\\"b\\$c\\\\d\"");
        assert_eq!(format_value("x#y"), "\"x#y\"");
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let env = EnvFile::open(dir.path().join(".env")).unwrap();
        assert_eq!(env.render(), "");
        assert_eq!(env.keys().count(), 0);
    }

    #[test]
    fn test_commit_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let mut env = EnvFile::open(&path).unwrap();
        env.upsert("A", "1").unwrap();
        env.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "A=1\n");
        assert!(!temp_path(&path).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_commit_creates_private_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let mut env = EnvFile::open(&path).unwrap();
        env.upsert("A", "1").unwrap();
        env.commit().unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_ensure_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        assert!(ensure_exists(&path).unwrap());
        assert!(path.exists());
        assert!(!ensure_exists(&path).unwrap());
    }

    #[test]
    fn test_ensure_exists_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join(".env");
        assert!(ensure_exists(&path).is_err());
    }

    #[test]
    fn test_resolve_dir_expands_tilde() {
        let dir = resolve_dir(Some("/srv/app")).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/app"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_dir(Some("~")).unwrap(), home);
        }
    }

    #[test]
    fn test_default_path() {
        assert_eq!(
            default_path(Path::new("/home/me")),
            PathBuf::from("/home/me/.env")
        );
    }
}
