//! Flat `KEY=value` secrets files delivered out-of-band by the provisioning
//! system (e.g. mounted under `/vault/secrets/`).
//!
//! The format is deliberately forgiving: blank lines and lines without a `=`
//! are skipped without complaint, only the first `=` splits key from value,
//! and quote characters are stripped from values because some provisioners
//! emit shell-style quoting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("failed to read secrets file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("secrets file {path} is missing required key {key}")]
    MissingKey { path: PathBuf, key: &'static str },
}

/// A parsed secrets file: a case-sensitive key → value map.
#[derive(Debug, Clone)]
pub struct SecretsFile {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl SecretsFile {
    /// Read and parse a secrets file. Only a missing or unreadable file is an
    /// error — malformed lines are skipped, missing keys surface on lookup.
    pub fn load(path: &Path) -> Result<Self, SecretsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SecretsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            values: parse(&raw),
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Lookup that treats an absent key as an error, for keys the caller
    /// cannot proceed without.
    pub fn require(&self, key: &'static str) -> Result<&str, SecretsError> {
        self.get(key).ok_or_else(|| SecretsError::MissingKey {
            path: self.path.clone(),
            key,
        })
    }
}

fn parse(raw: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        // Split on the first '=' only; lines without one are silently skipped.
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        values.insert(key.trim().to_string(), strip_quotes(value.trim()));
    }
    values
}

/// Remove quote characters throughout the value, not just at the ends.
/// The escaped variant `\'` goes first so it is removed as a unit.
fn strip_quotes(value: &str) -> String {
    value.replace("\\'", "").replace(['"', '\''], "")
}

/// Admin bootstrap credentials (`ADMIN_USER`).
#[derive(Debug, Clone)]
pub struct AdminSecrets {
    pub admin_user: String,
}

impl AdminSecrets {
    pub fn load(path: &Path) -> Result<Self, SecretsError> {
        let file = SecretsFile::load(path)?;
        Ok(Self {
            admin_user: file.require("ADMIN_USER")?.to_string(),
        })
    }
}

/// Outgoing-mail settings bundle. All keys are required except `SMTP_SEC`,
/// which defaults to `tls`.
#[derive(Debug, Clone)]
pub struct SmtpSecrets {
    pub host: String,
    pub port: String,
    pub security: String,
    pub name: String,
    pub password: String,
    pub from_address: String,
    pub domain: String,
}

impl SmtpSecrets {
    pub fn load(path: &Path) -> Result<Self, SecretsError> {
        let file = SecretsFile::load(path)?;
        Ok(Self {
            host: file.require("SMTP_HOST")?.to_string(),
            port: file.require("SMTP_PORT")?.to_string(),
            security: file.get("SMTP_SEC").unwrap_or("tls").to_string(),
            name: file.require("SMTP_NAME")?.to_string(),
            password: file.require("SMTP_PASSWORD")?.to_string(),
            from_address: file.require("MAIL_FROM_ADDRESS")?.to_string(),
            domain: file.require("MAIL_DOMAIN")?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_simple_pairs() {
        let file = write_temp("FOO=bar\nBAZ=qux\n");
        let secrets = SecretsFile::load(file.path()).unwrap();
        assert_eq!(secrets.get("FOO"), Some("bar"));
        assert_eq!(secrets.get("BAZ"), Some("qux"));
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let file = write_temp("\nFOO=bar\n\nthis line has no equals sign\nBAZ=qux\n   \n");
        let secrets = SecretsFile::load(file.path()).unwrap();
        assert_eq!(secrets.get("FOO"), Some("bar"));
        assert_eq!(secrets.get("BAZ"), Some("qux"));
        assert_eq!(secrets.get("this line has no equals sign"), None);
    }

    #[test]
    fn splits_on_first_equals_only() {
        let file = write_temp("CONN=host=db;port=5432\n");
        let secrets = SecretsFile::load(file.path()).unwrap();
        assert_eq!(secrets.get("CONN"), Some("host=db;port=5432"));
    }

    #[test]
    fn strips_all_quote_styles() {
        let file = write_temp("A=\"double\"\nB='single'\nC=\\'escaped\\'\nD=mi\"x'ed\n");
        let secrets = SecretsFile::load(file.path()).unwrap();
        for key in ["A", "B", "C", "D"] {
            let value = secrets.get(key).unwrap();
            assert!(!value.contains('"'), "{key} still has a double quote");
            assert!(!value.contains('\''), "{key} still has a single quote");
        }
        assert_eq!(secrets.get("D"), Some("mixed"));
    }

    #[test]
    fn trims_whitespace_around_key_and_value() {
        let file = write_temp("  FOO  =  bar  \n");
        let secrets = SecretsFile::load(file.path()).unwrap();
        assert_eq!(secrets.get("FOO"), Some("bar"));
    }

    #[test]
    fn missing_key_is_a_lookup_error_not_a_parse_error() {
        let file = write_temp("FOO=bar\n");
        let secrets = SecretsFile::load(file.path()).unwrap();
        assert!(matches!(
            secrets.require("MISSING"),
            Err(SecretsError::MissingKey { key: "MISSING", .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = SecretsFile::load(Path::new("/nonexistent/secrets")).unwrap_err();
        assert!(matches!(err, SecretsError::Io { .. }));
    }

    #[test]
    fn smtp_security_defaults_to_tls() {
        let file = write_temp(
            "SMTP_HOST=mail.example.org\nSMTP_PORT=587\nSMTP_NAME=mailer\n\
             SMTP_PASSWORD=hunter2\nMAIL_FROM_ADDRESS=no-reply\nMAIL_DOMAIN=example.org\n",
        );
        let smtp = SmtpSecrets::load(file.path()).unwrap();
        assert_eq!(smtp.security, "tls");
        assert_eq!(smtp.host, "mail.example.org");
    }

    #[test]
    fn smtp_requires_host() {
        let file = write_temp("SMTP_PORT=587\n");
        assert!(matches!(
            SmtpSecrets::load(file.path()),
            Err(SecretsError::MissingKey {
                key: "SMTP_HOST",
                ..
            })
        ));
    }

    #[test]
    fn admin_user_is_unquoted() {
        let file = write_temp("ADMIN_USER='admin'\nADMIN_PASSWORD='secret'\n");
        let admin = AdminSecrets::load(file.path()).unwrap();
        assert_eq!(admin.admin_user, "admin");
    }
}
