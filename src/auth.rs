//! Login cookies persisted between runs.
//!
//! The cookie file holds either a JSON list of cookie records (as exported by
//! a browser session) or a plain `name=value; name2=value2` header line.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuarkError, Result};

/// Only cookies for this domain are sent to the API.
const COOKIE_DOMAIN: &str = "quark";

/// A single cookie as exported by the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    /// Unix seconds; `-1` or missing for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
}

/// Validated set of login cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCookies {
    pairs: Vec<(String, String)>,
}

impl LoginCookies {
    /// Load cookies from the cookie file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = match fs::read_to_string(path.as_ref()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(QuarkError::MissingCookies),
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content, unix_now())
    }

    /// Parse cookie file content, rejecting expired or malformed input.
    pub fn parse(content: &str, now: i64) -> Result<Self> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(QuarkError::MissingCookies);
        }

        if trimmed.starts_with('[') {
            let records: Vec<CookieRecord> = serde_json::from_str(trimmed)
                .map_err(|e| QuarkError::CookieParseError(format!("invalid cookie list: {}", e)))?;
            return Self::from_records(records, now);
        }

        Self::from_header(trimmed)
    }

    fn from_records(records: Vec<CookieRecord>, now: i64) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut expired = 0;
        for record in records {
            if !record.domain.contains(COOKIE_DOMAIN) {
                continue;
            }
            if let Some(expires) = record.expires {
                if expires > 0.0 && (expires as i64) < now {
                    debug!("Skipping cookie {}, expired at {}", record.name, expires);
                    expired += 1;
                    continue;
                }
            }
            pairs.push((record.name, record.value));
        }

        if pairs.is_empty() && expired > 0 {
            return Err(QuarkError::CookiesExpired);
        }
        if pairs.is_empty() {
            return Err(QuarkError::CookieParseError(
                "no quark.cn cookies in cookie list".to_string(),
            ));
        }
        Ok(Self { pairs })
    }

    /// Parse a raw `Cookie` header value.
    pub fn from_header(header: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for part in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| {
                QuarkError::CookieParseError(format!("expected name=value, got \"{}\"", part))
            })?;
            if name.trim().is_empty() {
                return Err(QuarkError::CookieParseError(format!(
                    "empty cookie name in \"{}\"",
                    part
                )));
            }
            pairs.push((name.trim().to_string(), value.trim().to_string()));
        }

        if pairs.is_empty() {
            return Err(QuarkError::MissingCookies);
        }
        Ok(Self { pairs })
    }

    /// Value for the `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Persist as a header line.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.header_value())?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
