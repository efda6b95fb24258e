//! URL parser for Quark share links and drive folder links.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{QuarkError, Result};
use crate::models::{ShareLink, ROOT_FID};

/// Share links look like `https://pan.quark.cn/s/<pwd_id>[?pwd=<code>]`.
static SHARE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/\s]+/s/([a-zA-Z0-9_-]+)").expect("Invalid share URL regex")
});

static PASSCODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]pwd=([a-zA-Z0-9]+)").expect("Invalid passcode regex"));

/// Folder links from the web UI: `https://pan.quark.cn/list#/list/all/<fid>-<name>/...`.
static FOLDER_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/\s]+/list#/list/all/(?:.*/)?([a-fA-F0-9]{32})(?:-[^/]*)?/?$")
        .expect("Invalid folder URL regex")
});

static FID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]{32}$").expect("Invalid fid regex"));

/// Parse a share URL into its share id and optional passcode.
///
/// # Examples
///
/// ```
/// use quark_pan::url_parser::parse_share_url;
///
/// let link = parse_share_url("https://pan.quark.cn/s/abc123?pwd=x1y2").unwrap();
/// assert_eq!(link.pwd_id, "abc123");
/// assert_eq!(link.passcode.as_deref(), Some("x1y2"));
/// ```
pub fn parse_share_url(url: &str) -> Result<ShareLink> {
    let trimmed = url.trim();

    let pwd_id = SHARE_URL_REGEX
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| QuarkError::InvalidShareUrl(url.to_string()))?;

    let passcode = PASSCODE_REGEX
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Ok(ShareLink { pwd_id, passcode })
}

/// Extract a drive folder id from a web UI folder link, a raw 32-char id, or `0` for the root.
///
/// For nested folder links the deepest folder wins.
pub fn extract_folder_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    if trimmed == ROOT_FID || FID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    if let Some(captures) = FOLDER_URL_REGEX.captures(trimmed) {
        if let Some(id) = captures.get(1) {
            return Ok(id.as_str().to_string());
        }
    }

    Err(QuarkError::InvalidFolderId(url_or_id.to_string()))
}

/// Load share URLs from a newline-delimited file, skipping lines without a link.
pub fn load_url_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("http"))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_share_url() {
        let link = parse_share_url("https://pan.quark.cn/s/1a2b3c4d5e").unwrap();
        assert_eq!(link.pwd_id, "1a2b3c4d5e");
        assert_eq!(link.passcode, None);
    }

    #[test]
    fn test_parse_share_url_with_passcode() {
        let link = parse_share_url("https://pan.quark.cn/s/1a2b3c4d5e?pwd=AbC1").unwrap();
        assert_eq!(link.pwd_id, "1a2b3c4d5e");
        assert_eq!(link.passcode.as_deref(), Some("AbC1"));
    }

    #[test]
    fn test_parse_share_url_with_fragment() {
        let link = parse_share_url("https://pan.quark.cn/s/1a2b3c4d5e#/list/share").unwrap();
        assert_eq!(link.pwd_id, "1a2b3c4d5e");
    }

    #[test]
    fn test_invalid_share_url() {
        assert!(parse_share_url("https://pan.quark.cn/list").is_err());
        assert!(parse_share_url("1a2b3c4d5e").is_err());
        assert!(parse_share_url("").is_err());
    }

    #[test]
    fn test_extract_folder_id() {
        let fid = "0123456789abcdef0123456789abcdef";
        assert_eq!(extract_folder_id(fid).unwrap(), fid);
        assert_eq!(extract_folder_id("0").unwrap(), "0");

        let url = format!("https://pan.quark.cn/list#/list/all/{}-Movies", fid);
        assert_eq!(extract_folder_id(&url).unwrap(), fid);
    }

    #[test]
    fn test_extract_folder_id_invalid() {
        assert!(extract_folder_id("movies").is_err());
        assert!(extract_folder_id("   ").is_err());
    }
}
