//! Password input.
//!
//! The initializer never reads the terminal directly; it asks a
//! [`CredentialProvider`]. [`TerminalPrompt`] is the interactive provider
//! and [`FixedPassword`] hands out a known value.

use std::fmt;
use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use zeroize::Zeroizing;

use crate::error::{PsqlHelperError, Result};

/// A password on its way into the env file.
///
/// `Debug` and `Display` never show the value. The buffer held here is
/// zeroed on drop; copies handed out through [`Password::expose`] are not.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Zeroizing<String>);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(********)")
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

/// Source of passwords for credential sets
pub trait CredentialProvider {
    /// Obtain the password for `key` (e.g. `TESTDB_PASSWORD`).
    ///
    /// Implementations must not echo or log the value.
    fn password(&mut self, key: &str) -> Result<Password>;
}

/// Hands out the same password every time
#[derive(Debug, Clone)]
pub struct FixedPassword(Password);

impl FixedPassword {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Password::new(value))
    }
}

impl CredentialProvider for FixedPassword {
    fn password(&mut self, key: &str) -> Result<Password> {
        tracing::debug!(key, "Using fixed password");
        Ok(self.0.clone())
    }
}

/// Interactive prompt on the controlling terminal.
///
/// On a TTY the password is typed in raw mode so nothing is echoed. When stdin
/// is not a terminal (e.g. `echo secret | psql-helper init --persist`)
/// one line is read from stdin instead.
#[derive(Debug, Default)]
pub struct TerminalPrompt {
    _private: (),
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialProvider for TerminalPrompt {
    fn password(&mut self, key: &str) -> Result<Password> {
        let value = if io::stdin().is_terminal() {
            read_hidden(&format!("Password for {}: ", key))?
        } else {
            tracing::debug!(key, "stdin is not a terminal, reading password line");
            read_line(io::stdin().lock())?
        };

        if value.is_empty() {
            return Err(PsqlHelperError::validation(format!(
                "{} must not be empty",
                key
            )));
        }
        Ok(Password(value))
    }
}

/// Restores cooked mode even if reading fails midway
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()
            .map_err(|e| PsqlHelperError::prompt(format!("Failed to enable raw mode: {}", e)))?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn read_hidden(label: &str) -> Result<Zeroizing<String>> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", label)?;
    stderr.flush()?;

    let result = {
        let _guard = RawModeGuard::enable()?;
        let mut input = HiddenInput::default();
        loop {
            match event::read()? {
                Event::Key(key) => match input.handle_key(key) {
                    Some(done) => break done,
                    None => continue,
                },
                Event::Paste(text) => input.buffer.push_str(&text),
                _ => {}
            }
        }
    };

    // Raw mode swallowed the newline
    writeln!(stderr)?;
    result
}

/// Line editor state for the hidden prompt
#[derive(Default)]
struct HiddenInput {
    buffer: Zeroizing<String>,
}

impl HiddenInput {
    /// Feed one key; `Some` once the prompt is finished or cancelled
    fn handle_key(&mut self, key: KeyEvent) -> Option<Result<Zeroizing<String>>> {
        if key.kind == KeyEventKind::Release {
            return None;
        }

        match key.code {
            KeyCode::Enter => Some(Ok(std::mem::take(&mut self.buffer))),
            KeyCode::Char('c') | KeyCode::Char('d')
                if key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                Some(Err(PsqlHelperError::prompt("Password entry cancelled")))
            }
            KeyCode::Esc => Some(Err(PsqlHelperError::prompt("Password entry cancelled"))),
            KeyCode::Backspace => {
                self.buffer.pop();
                None
            }
            // Line-editing chords such as Ctrl-U are not part of the password
            KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::CONTROL) => None,
            KeyCode::Char(c) => {
                self.buffer.push(c);
                None
            }
            _ => None,
        }
    }
}

fn read_line<R: BufRead>(mut reader: R) -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        return Err(PsqlHelperError::prompt("No password on stdin"));
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(line)
}
