//! Data models for Quark Drive API requests and responses.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QuarkError, Result};

/// Folder id of the drive root.
pub const ROOT_FID: &str = "0";

/// Display name used for the drive root.
pub const ROOT_NAME: &str = "root";

/// A file or folder as returned by the share-detail and file-sort endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub fid: String,
    pub file_name: String,
    #[serde(default)]
    pub file_type: i64,
    #[serde(rename = "dir", default)]
    pub is_dir: bool,
    #[serde(rename = "pdir_fid", default)]
    pub parent_fid: String,
    /// Number of children, only present for directories.
    #[serde(rename = "include_items", default)]
    pub item_count: Option<u64>,
    #[serde(default)]
    pub share_fid_token: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub size: u64,
}

impl std::fmt::Display for ShareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dir {
            let items = self
                .item_count
                .map(|n| format!("{} items", n))
                .unwrap_or_else(|| "-".to_string());
            write!(f, "{}\t{}\t{}/", self.fid, items, self.file_name)
        } else {
            write!(f, "{}\t{}\t{}", self.fid, format_size(self.size), self.file_name)
        }
    }
}

/// Format bytes into human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// The server reports some flags either as `0`/`1` or as booleans.
fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrInt {
        Bool(bool),
        Int(i64),
    }

    Ok(match Option::<BoolOrInt>::deserialize(deserializer)? {
        Some(BoolOrInt::Bool(b)) => b,
        Some(BoolOrInt::Int(n)) => n != 0,
        None => false,
    })
}

/// Pagination block attached to listing responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMetadata {
    #[serde(rename = "_total", default)]
    pub total: u64,
    #[serde(rename = "_size", default)]
    pub size: u64,
    #[serde(rename = "_count", default)]
    pub count: u64,
    #[serde(rename = "_page", default)]
    pub page: u64,
}

/// Common envelope wrapping every Quark API response.
///
/// `data` is kept as raw JSON because failed calls return `{}` or `null` in
/// place of the typed payload.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: Option<PageMetadata>,
}

impl ApiEnvelope {
    pub fn is_ok(&self) -> bool {
        self.code == 0 && (self.status == 200 || self.status == 0)
    }

    /// Convert into the typed payload, or an `ApiError` if the call failed.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T> {
        if !self.is_ok() {
            return Err(QuarkError::ApiError {
                code: self.code,
                message: self.message,
            });
        }
        Ok(serde_json::from_value(self.data)?)
    }

    /// Like `into_data`, for listings. The pagination block is required.
    pub fn into_page<T: DeserializeOwned>(mut self) -> Result<(T, PageMetadata)> {
        let meta = self.metadata.take();
        let code = self.code;
        let data = self.into_data()?;
        let meta = meta.ok_or_else(|| QuarkError::ApiError {
            code,
            message: "listing response has no pagination metadata".to_string(),
        })?;
        Ok((data, meta))
    }
}

/// Parsed share link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub pwd_id: String,
    pub passcode: Option<String>,
}

/// Per-run share session: the share id plus its capability token.
#[derive(Debug, Clone)]
pub struct SharePageSession {
    pub pwd_id: String,
    pub stoken: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenData {
    pub stoken: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShareDetailData {
    #[serde(default, deserialize_with = "bool_or_int")]
    pub is_owner: bool,
    #[serde(default)]
    pub list: Vec<ShareEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DriveListData {
    #[serde(default)]
    pub list: Vec<ShareEntry>,
}

/// One page of a listing.
#[derive(Debug, Clone)]
pub struct ListPage {
    pub entries: Vec<ShareEntry>,
    pub meta: PageMetadata,
    pub is_owner: bool,
}

/// Fully accumulated share listing of one folder.
#[derive(Debug, Clone, Default)]
pub struct ShareDetail {
    pub is_owner: bool,
    pub entries: Vec<ShareEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TaskCreated {
    pub task_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaveAs {
    #[serde(default)]
    pub to_pdir_name: Option<String>,
}

/// Payload of the task status endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub task_title: String,
    #[serde(default)]
    pub save_as: Option<SaveAs>,
    #[serde(default)]
    pub share_id: Option<String>,
}

/// Terminal outcome of polling an asynchronous server-side job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Completed {
        destination_folder_name: String,
        share_id: Option<String>,
    },
    QuotaExceeded {
        message: String,
    },
    DestinationFolderMissing {
        message: String,
    },
    OtherFatal {
        code: i64,
        message: String,
    },
    RetriesExhausted {
        attempts: u32,
    },
}

impl TaskResult {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskResult::QuotaExceeded { .. }
                | TaskResult::DestinationFolderMissing { .. }
                | TaskResult::OtherFatal { .. }
        )
    }
}

impl std::fmt::Display for TaskResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskResult::Completed {
                destination_folder_name,
                ..
            } => write!(f, "completed into \"{}\"", destination_folder_name),
            TaskResult::QuotaExceeded { message } => {
                write!(f, "drive capacity exceeded ({})", message)
            }
            TaskResult::DestinationFolderMissing { message } => write!(
                f,
                "destination folder no longer exists, switch the save folder and retry ({})",
                message
            ),
            TaskResult::OtherFatal { code, message } => write!(f, "error {}: {}", code, message),
            TaskResult::RetriesExhausted { attempts } => {
                write!(f, "not finished after {} attempts", attempts)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareLinkInfo {
    pub share_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub passcode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadItem {
    pub fid: String,
    pub file_name: String,
    pub download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedDir {
    pub fid: String,
}

/// Persisted save destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveDirectoryConfig {
    pub pdir_id: String,
    pub dir_name: String,
}

impl SaveDirectoryConfig {
    pub fn root() -> Self {
        Self {
            pdir_id: ROOT_FID.to_string(),
            dir_name: ROOT_NAME.to_string(),
        }
    }

    /// The destination for a folder id that needs no name lookup, i.e. the root.
    pub fn well_known(pdir_id: &str) -> Option<Self> {
        (pdir_id.trim() == ROOT_FID).then(Self::root)
    }
}

/// A failed share attempt kept for later resubmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRecord {
    pub index: usize,
    pub parent_name: String,
    pub folder_name: String,
    pub fid: String,
}

impl std::fmt::Display for RetryRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.index, self.parent_name, self.folder_name, self.fid
        )
    }
}

/// A successfully created share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRecord {
    pub index: usize,
    pub parent_name: String,
    pub folder_name: String,
    pub share_url: String,
}

impl std::fmt::Display for ShareRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} | {} | {}",
            self.index, self.parent_name, self.folder_name, self.share_url
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Visibility {
    #[default]
    Public,
    /// Requires a passcode to open.
    Private,
}

impl Visibility {
    pub fn url_type(self) -> u8 {
        match self {
            Visibility::Public => 1,
            Visibility::Private => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExpiryClass {
    #[default]
    Permanent,
    OneDay,
    SevenDays,
    ThirtyDays,
}

impl ExpiryClass {
    pub fn expired_type(self) -> u8 {
        match self {
            ExpiryClass::Permanent => 1,
            ExpiryClass::OneDay => 2,
            ExpiryClass::SevenDays => 3,
            ExpiryClass::ThirtyDays => 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShareOptions {
    pub visibility: Visibility,
    pub expiry: ExpiryClass,
    pub passcode: Option<String>,
}

/// Body of the create-share request.
#[derive(Debug, Serialize)]
pub struct ShareRequest {
    pub fid_list: Vec<String>,
    pub title: String,
    pub url_type: u8,
    pub expired_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passcode: Option<String>,
}
