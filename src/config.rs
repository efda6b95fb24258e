//! Plain-file state kept between runs: save destination, login cookies,
//! share output and the share retry ledger.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{QuarkError, Result};
use crate::models::{RetryRecord, SaveDirectoryConfig, ShareRecord};

pub const DEFAULT_CONFIG_DIR: &str = "./config";
pub const DEFAULT_SHARE_DIR: &str = "./share";

const SAVE_DIR_FILE: &str = "save_dir.conf";
const COOKIE_FILE: &str = "cookies.txt";
const SHARE_URL_FILE: &str = "share_url.txt";
const SHARE_URL_BACKUP_FILE: &str = "share_url_backup.txt";
const RETRY_FILE: &str = "retry.txt";

const FIELD_SEPARATOR: &str = " | ";

/// Locations of the files this tool reads and writes.
#[derive(Debug, Clone)]
pub struct StateStore {
    config_dir: PathBuf,
    share_dir: PathBuf,
}

impl StateStore {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(config_dir: P, share_dir: Q) -> Self {
        Self {
            config_dir: config_dir.into(),
            share_dir: share_dir.into(),
        }
    }

    pub fn cookie_path(&self) -> PathBuf {
        self.config_dir.join(COOKIE_FILE)
    }

    pub fn save_dir_path(&self) -> PathBuf {
        self.config_dir.join(SAVE_DIR_FILE)
    }

    pub fn share_url_path(&self) -> PathBuf {
        self.share_dir.join(SHARE_URL_FILE)
    }

    pub fn retry_path(&self) -> PathBuf {
        self.share_dir.join(RETRY_FILE)
    }

    /// Saved destination folder; the drive root when nothing is saved yet.
    pub fn load_save_dir(&self) -> Result<SaveDirectoryConfig> {
        let path = self.save_dir_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SaveDirectoryConfig::root()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(SaveDirectoryConfig::root());
        }
        parse_save_dir(&content).map_err(|reason| QuarkError::StateFile {
            path,
            line: 1,
            reason,
        })
    }

    pub fn store_save_dir(&self, config: &SaveDirectoryConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir)?;
        fs::write(
            self.save_dir_path(),
            format!("{},{}", config.pdir_id, config.dir_name),
        )?;
        debug!("Saved destination {} ({})", config.dir_name, config.pdir_id);
        Ok(())
    }

    /// Start a fresh share output file, keeping the previous one as a backup.
    pub fn reset_share_output(&self) -> Result<()> {
        fs::create_dir_all(&self.share_dir)?;
        let current = self.share_url_path();
        if current.exists() {
            let backup = self.share_dir.join(SHARE_URL_BACKUP_FILE);
            fs::copy(&current, &backup)?;
            info!("Previous share list backed up to {}", backup.display());
        }
        fs::write(&current, "")?;
        Ok(())
    }

    pub fn append_share_record(&self, record: &ShareRecord) -> Result<()> {
        append_line(&self.share_url_path(), &record.to_string())
    }

    pub fn append_retry_record(&self, record: &RetryRecord) -> Result<()> {
        append_line(&self.retry_path(), &record.to_string())
    }

    /// Read the retry ledger. A missing ledger is empty; a malformed line is an error.
    pub fn load_retry_ledger(&self) -> Result<Vec<RetryRecord>> {
        let path = self.retry_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                parse_retry_line(line).map_err(|reason| QuarkError::StateFile {
                    path: path.clone(),
                    line: idx + 1,
                    reason,
                })
            })
            .collect()
    }

    /// Replace the retry ledger with `records`.
    pub fn write_retry_ledger(&self, records: &[RetryRecord]) -> Result<()> {
        fs::create_dir_all(&self.share_dir)?;
        let content: String = records.iter().map(|r| format!("{}\n", r)).collect();
        fs::write(self.retry_path(), content)?;
        Ok(())
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_DIR, DEFAULT_SHARE_DIR)
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Parse `folder_id,folder_name`. A full-width comma is accepted as separator.
pub fn parse_save_dir(content: &str) -> std::result::Result<SaveDirectoryConfig, String> {
    let normalized = content.trim().replace('，', ",");
    let (pdir_id, dir_name) = normalized
        .split_once(',')
        .ok_or_else(|| "expected `folder_id,folder_name`".to_string())?;

    let pdir_id = pdir_id.trim();
    if pdir_id.is_empty() {
        return Err("empty folder id".to_string());
    }
    Ok(SaveDirectoryConfig {
        pdir_id: pdir_id.to_string(),
        dir_name: dir_name.trim().to_string(),
    })
}

/// Parse `index | parent_name | folder_name | fid`.
pub fn parse_retry_line(line: &str) -> std::result::Result<RetryRecord, String> {
    let malformed = || format!("expected `index | parent | folder | fid`, got \"{}\"", line);

    let (index, rest) = line.split_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    let (names, fid) = rest.rsplit_once(FIELD_SEPARATOR).ok_or_else(malformed)?;
    let (parent_name, folder_name) = names.split_once(FIELD_SEPARATOR).ok_or_else(malformed)?;

    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad index \"{}\": {}", index.trim(), e))?;
    let fid = fid.trim();
    if fid.is_empty() {
        return Err(malformed());
    }

    Ok(RetryRecord {
        index,
        parent_name: parent_name.trim().to_string(),
        folder_name: folder_name.trim().to_string(),
        fid: fid.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("config"), dir.path().join("share"))
    }

    #[test]
    fn test_parse_save_dir() {
        let config = parse_save_dir("abc123,Movies\n").unwrap();
        assert_eq!(config.pdir_id, "abc123");
        assert_eq!(config.dir_name, "Movies");

        let config = parse_save_dir("abc123，Movies").unwrap();
        assert_eq!(config.dir_name, "Movies");

        assert!(parse_save_dir("abc123").is_err());
        assert!(parse_save_dir(",Movies").is_err());
    }

    #[test]
    fn test_missing_save_dir_is_root() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            store(&dir).load_save_dir().unwrap(),
            SaveDirectoryConfig::root()
        );
    }

    #[test]
    fn test_save_dir_persists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let config = SaveDirectoryConfig {
            pdir_id: "fid9".to_string(),
            dir_name: "Shows, 2024".to_string(),
        };
        store.store_save_dir(&config).unwrap();
        assert_eq!(store.load_save_dir().unwrap(), config);
    }

    #[test]
    fn test_parse_retry_line() {
        let record = parse_retry_line("7 | Anime | Season 2 | 0123abcd").unwrap();
        assert_eq!(record.index, 7);
        assert_eq!(record.parent_name, "Anime");
        assert_eq!(record.folder_name, "Season 2");
        assert_eq!(record.fid, "0123abcd");

        assert!(parse_retry_line("7 | Anime | 0123abcd").is_err());
        assert!(parse_retry_line("x | a | b | c").is_err());
    }

    #[test]
    fn test_retry_ledger_round_trip_and_errors() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.load_retry_ledger().unwrap().is_empty());

        let record = RetryRecord {
            index: 1,
            parent_name: "A".to_string(),
            folder_name: "B".to_string(),
            fid: "f1".to_string(),
        };
        store.append_retry_record(&record).unwrap();
        assert_eq!(store.load_retry_ledger().unwrap(), vec![record]);

        fs::write(store.retry_path(), "1 | A | B | f1\n\ngarbage\n").unwrap();
        match store.load_retry_ledger() {
            Err(QuarkError::StateFile { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reset_share_output_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .append_share_record(&ShareRecord {
                index: 1,
                parent_name: "A".to_string(),
                folder_name: "B".to_string(),
                share_url: "https://pan.quark.cn/s/x".to_string(),
            })
            .unwrap();

        store.reset_share_output().unwrap();

        assert_eq!(fs::read_to_string(store.share_url_path()).unwrap(), "");
        let backup = fs::read_to_string(dir.path().join("share").join(SHARE_URL_BACKUP_FILE)).unwrap();
        assert_eq!(backup, "1 | A | B | https://pan.quark.cn/s/x\n");
    }
}
