//! Store password resolution.
//!
//! # Contract
//! - Config YAML stores only the env var NAME (`store.password_env`), never
//!   the password.
//! - Resolution order: named env var, then a pgpass-format file
//!   (`store.pgpass`, else `$PGPASSFILE`, else `~/.pgpass`), then no password.
//! - `Debug` on [`StorePassword`] redacts the value.
//! - Error messages reference env var NAMES and file paths, never values.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{ConfigError, StoreSection};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSource {
    Env(String),
    Pgpass(PathBuf),
    None,
}

/// Resolved store password. **Value is redacted in `Debug` output.**
#[derive(Clone)]
pub struct StorePassword {
    pub password: Option<String>,
    pub source: PasswordSource,
}

impl std::fmt::Debug for StorePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePassword")
            .field("password", &self.password.as_ref().map(|_| "<REDACTED>"))
            .field("source", &self.source)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve the password for the configured store connection.
///
/// A missing default pgpass file is not an error; a missing file the config
/// names explicitly is.
pub fn resolve_store_password(store: &StoreSection) -> Result<StorePassword, ConfigError> {
    if let Some(var) = store.password_env.as_deref() {
        if let Some(password) = resolve_env(var) {
            return Ok(StorePassword {
                password: Some(password),
                source: PasswordSource::Env(var.to_string()),
            });
        }
    }

    let (path, explicit) = match &store.pgpass {
        Some(p) => (expand_home(p), true),
        None => match default_pgpass_path() {
            Some(p) => (p, false),
            None => return Ok(no_password()),
        },
    };

    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound && !explicit => return Ok(no_password()),
        Err(source) => {
            return Err(ConfigError::Pgpass {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let port = store.port.to_string();
    match pgpass_lookup(&contents, &store.host, &port, &store.database, &store.user) {
        Some(password) => Ok(StorePassword {
            password: Some(password),
            source: PasswordSource::Pgpass(path),
        }),
        None => Ok(no_password()),
    }
}

/// First matching entry of a pgpass-format document.
///
/// Each line is `hostname:port:database:username:password`; `*` in any of the
/// first four fields matches anything; `\:` and `\\` are literal. Blank lines
/// and `#` comments are skipped, as are lines with too few fields.
pub fn pgpass_lookup(
    contents: &str,
    host: &str,
    port: &str,
    database: &str,
    user: &str,
) -> Option<String> {
    let wanted = [host, port, database, user];
    contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(split_pgpass_line)
        .filter(|fields| fields.len() >= 5)
        .find(|fields| {
            fields
                .iter()
                .zip(wanted)
                .all(|(field, want)| field == "*" || field == want)
        })
        .map(|mut fields| fields.swap_remove(4))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn no_password() -> StorePassword {
    StorePassword {
        password: None,
        source: PasswordSource::None,
    }
}

/// `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn default_pgpass_path() -> Option<PathBuf> {
    if let Some(p) = resolve_env("PGPASSFILE") {
        return Some(PathBuf::from(p));
    }
    resolve_env("HOME").map(|home| Path::new(&home).join(".pgpass"))
}

fn expand_home(p: &Path) -> PathBuf {
    match (p.strip_prefix("~"), resolve_env("HOME")) {
        (Ok(rest), Some(home)) => Path::new(&home).join(rest),
        _ => p.to_path_buf(),
    }
}

fn split_pgpass_line(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(5);
    let mut cur = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    cur.push(next);
                }
            }
            // The password is the last field and may itself contain ':'.
            ':' if fields.len() < 4 => fields.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    fields.push(cur);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const PGPASS: &str = "\
# comment line
otherhost:5433:metacat:dataone_readonly:wrong-host
localhost:5433:metacat:dataone_readonly:s3cret
*:*:metacat:*:fallback
*:*:*:*:catch-all
";

    #[test]
    fn exact_entry_wins_over_later_wildcards() {
        let got = pgpass_lookup(PGPASS, "localhost", "5433", "metacat", "dataone_readonly");
        assert_eq!(got.as_deref(), Some("s3cret"));
    }

    #[test]
    fn wildcards_match_any_value() {
        let got = pgpass_lookup(PGPASS, "db.example", "6543", "metacat", "reader");
        assert_eq!(got.as_deref(), Some("fallback"));
        let got = pgpass_lookup(PGPASS, "db.example", "6543", "other", "reader");
        assert_eq!(got.as_deref(), Some("catch-all"));
    }

    #[test]
    fn no_match_is_none() {
        let got = pgpass_lookup("h:1:d:u:p\n", "h", "2", "d", "u");
        assert!(got.is_none());
    }

    #[test]
    fn escaped_colon_and_colon_in_password() {
        let fields = split_pgpass_line(r"h\:x:5433:db:user:pa:ss");
        assert_eq!(fields, ["h:x", "5433", "db", "user", "pa:ss"]);
    }

    #[test]
    fn debug_redacts_password() {
        let p = StorePassword {
            password: Some("hunter2".to_string()),
            source: PasswordSource::Env("SMW_PW".to_string()),
        };
        let dbg = format!("{p:?}");
        assert!(dbg.contains("<REDACTED>"));
        assert!(!dbg.contains("hunter2"));
    }
}
