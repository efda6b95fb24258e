//! Quark Drive API client.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT_LANGUAGE, COOKIE, ORIGIN, REFERER, USER_AGENT,
};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::auth::LoginCookies;
use crate::error::{QuarkError, Result};
use crate::models::{
    ApiEnvelope, CreatedDir, DownloadItem, DriveListData, ListPage, SharePageSession,
    ShareDetail, ShareDetailData, ShareEntry, ShareLink, ShareLinkInfo, ShareRequest,
    TaskCreated, TokenData, UserInfo, ROOT_FID,
};
use crate::pagination::{collect_pages, DEFAULT_PAGE_SIZE};

/// Host serving the drive and share-page API.
const DRIVE_PC_BASE: &str = "https://drive-pc.quark.cn";

/// Host serving the save-to-drive endpoint.
const DRIVE_BASE: &str = "https://drive.quark.cn";

/// Host serving account endpoints.
const PAN_BASE: &str = "https://pan.quark.cn";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/94.0.4606.71 Safari/537.36 Core/1.94.225.400 QQBrowser/12.2.5544.400";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sort order for share listings.
pub const SHARE_DETAIL_SORT: &str = "file_type:asc,updated_at:desc";

/// Deterministic sort order for drive folder walks.
pub const FOLDER_SORT: &str = "file_type:asc,file_name:asc";

/// Error code returned when a folder with the same name already exists.
const CODE_NAME_CONFLICT: i64 = 23008;

/// Base URLs of the three API hosts.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub drive_pc: String,
    pub drive: String,
    pub pan: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            drive_pc: DRIVE_PC_BASE.to_string(),
            drive: DRIVE_BASE.to_string(),
            pan: PAN_BASE.to_string(),
        }
    }
}

impl Endpoints {
    /// Route every host to the same base URL.
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            drive_pc: base.clone(),
            drive: base.clone(),
            pan: base,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    data: Option<UserInfo>,
}

/// Client for the Quark Drive web API.
///
/// Requests are issued one at a time; the cookie and header map are fixed at
/// construction.
pub struct QuarkClient {
    http: Client,
    endpoints: Endpoints,
}

impl QuarkClient {
    /// Create a client against the production hosts.
    pub fn new(cookies: &LoginCookies) -> Result<Self> {
        Self::with_endpoints(cookies, Endpoints::default())
    }

    /// Create a client against custom hosts.
    pub fn with_endpoints(cookies: &LoginCookies, endpoints: Endpoints) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ORIGIN, HeaderValue::from_static("https://pan.quark.cn"));
        headers.insert(REFERER, HeaderValue::from_static("https://pan.quark.cn/"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
        headers.insert(COOKIE, HeaderValue::from_str(&cookies.header_value())?);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send a request and decode the common response envelope.
    async fn send(&self, request: RequestBuilder) -> Result<ApiEnvelope> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} {}", status, response.url().path());
        let body = response.text().await?;

        match serde_json::from_str::<ApiEnvelope>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(QuarkError::ApiError {
                code: status.as_u16() as i64,
                message: body,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Exchange a share id (and passcode) for the share's capability token.
    pub async fn get_stoken(&self, link: &ShareLink) -> Result<String> {
        let body = json!({
            "pwd_id": link.pwd_id,
            "passcode": link.passcode.clone().unwrap_or_default(),
        });

        let envelope = self
            .send(
                self.http
                    .post(format!(
                        "{}/1/clouddrive/share/sharepage/token",
                        self.endpoints.drive_pc
                    ))
                    .query(&common_params())
                    .json(&body),
            )
            .await?;

        match envelope.into_data::<TokenData>() {
            Ok(data) if !data.stoken.is_empty() => Ok(data.stoken),
            Ok(_) => Err(QuarkError::CapabilityError("empty stoken".to_string())),
            Err(QuarkError::ApiError { message, .. }) => Err(QuarkError::CapabilityError(message)),
            Err(QuarkError::Json(e)) => Err(QuarkError::CapabilityError(e.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Fetch one page of a share folder.
    pub async fn list_share_page(
        &self,
        session: &SharePageSession,
        pdir_fid: &str,
        page: u64,
        page_size: u64,
    ) -> Result<ListPage> {
        let mut params = common_params();
        params.extend([
            ("pwd_id", session.pwd_id.clone()),
            ("stoken", session.stoken.clone()),
            ("pdir_fid", pdir_fid.to_string()),
            ("force", "0".to_string()),
            ("_page", page.to_string()),
            ("_size", page_size.to_string()),
            ("_sort", SHARE_DETAIL_SORT.to_string()),
        ]);

        let envelope = self
            .send(
                self.http
                    .get(format!(
                        "{}/1/clouddrive/share/sharepage/detail",
                        self.endpoints.drive_pc
                    ))
                    .query(&params),
            )
            .await?;

        let (data, meta): (ShareDetailData, _) = envelope.into_page()?;
        Ok(ListPage {
            entries: data.list,
            meta,
            is_owner: data.is_owner,
        })
    }

    /// List every entry of a share folder, in server order.
    pub async fn get_share_detail(
        &self,
        session: &SharePageSession,
        pdir_fid: &str,
    ) -> Result<ShareDetail> {
        collect_pages(DEFAULT_PAGE_SIZE, move |page, size| {
            self.list_share_page(session, pdir_fid, page, size)
        })
        .await
    }

    /// Fetch one page of a folder in the user's own drive.
    pub async fn list_drive_page(
        &self,
        pdir_fid: &str,
        page: u64,
        page_size: u64,
        sort: &str,
    ) -> Result<ListPage> {
        let mut params = common_params();
        params.extend([
            ("pdir_fid", pdir_fid.to_string()),
            ("_page", page.to_string()),
            ("_size", page_size.to_string()),
            ("_fetch_total", "1".to_string()),
            ("_fetch_sub_dirs", "0".to_string()),
            ("_sort", sort.to_string()),
        ]);

        let envelope = self
            .send(
                self.http
                    .get(format!("{}/1/clouddrive/file/sort", self.endpoints.drive_pc))
                    .query(&params),
            )
            .await?;

        let (data, meta): (DriveListData, _) = envelope.into_page()?;
        Ok(ListPage {
            entries: data.list,
            meta,
            is_owner: true,
        })
    }

    /// List every entry of a drive folder.
    pub async fn list_drive_dir(&self, pdir_fid: &str, sort: &str) -> Result<Vec<ShareEntry>> {
        let detail = collect_pages(DEFAULT_PAGE_SIZE, move |page, size| {
            self.list_drive_page(pdir_fid, page, size, sort)
        })
        .await?;
        Ok(detail.entries)
    }

    /// Folders directly under the drive root.
    pub async fn list_root_folders(&self) -> Result<Vec<ShareEntry>> {
        let entries = self.list_drive_dir(ROOT_FID, FOLDER_SORT).await?;
        Ok(entries.into_iter().filter(|e| e.is_dir).collect())
    }

    /// Nickname of the logged-in account.
    pub async fn get_user_info(&self) -> Result<String> {
        let response = self
            .http
            .get(format!("{}/account/info", self.endpoints.pan))
            .query(&[("fr", "pc"), ("platform", "pc")])
            .send()
            .await?;

        let info: AccountInfo = response.json().await?;
        info.data
            .map(|user| user.nickname)
            .ok_or(QuarkError::NotLoggedIn)
    }

    /// Create a folder in the drive root and return its fid.
    pub async fn create_dir(&self, name: &str) -> Result<String> {
        let body = json!({
            "pdir_fid": ROOT_FID,
            "file_name": name,
            "dir_path": "",
            "dir_init_lock": false,
        });

        let envelope = self
            .send(
                self.http
                    .post(format!("{}/1/clouddrive/file", self.endpoints.drive_pc))
                    .query(&common_params())
                    .json(&body),
            )
            .await?;

        if envelope.code == CODE_NAME_CONFLICT {
            return Err(QuarkError::FolderConflict(name.to_string()));
        }
        let created: CreatedDir = envelope.into_data()?;
        Ok(created.fid)
    }

    /// Start a save-to-drive job for the given share entries.
    pub async fn submit_transfer(
        &self,
        session: &SharePageSession,
        fid_list: &[String],
        share_token_list: &[String],
        to_pdir_fid: &str,
    ) -> Result<String> {
        let body = json!({
            "fid_list": fid_list,
            "fid_token_list": share_token_list,
            "to_pdir_fid": to_pdir_fid,
            "pwd_id": session.pwd_id,
            "stoken": session.stoken,
            "pdir_fid": ROOT_FID,
            "scene": "link",
        });

        let envelope = self
            .send(
                self.http
                    .post(format!(
                        "{}/1/clouddrive/share/sharepage/save",
                        self.endpoints.drive
                    ))
                    .query(&common_params())
                    .json(&body),
            )
            .await?;

        let created: TaskCreated = envelope.into_data()?;
        info!("Transfer task created: {}", created.task_id);
        Ok(created.task_id)
    }

    /// Start a create-share job for one drive folder or file.
    pub async fn submit_share(&self, request: &ShareRequest) -> Result<String> {
        let envelope = self
            .send(
                self.http
                    .post(format!("{}/1/clouddrive/share", self.endpoints.drive_pc))
                    .query(&common_params())
                    .json(request),
            )
            .await?;

        let created: TaskCreated = envelope.into_data()?;
        debug!("Share task created: {}", created.task_id);
        Ok(created.task_id)
    }

    /// Query the status of an asynchronous job.
    ///
    /// The raw envelope is returned because failure codes carry meaning for the poller.
    pub async fn query_task(&self, task_id: &str, retry_index: u32) -> Result<ApiEnvelope> {
        let mut params = common_params();
        params.extend([
            ("task_id", task_id.to_string()),
            ("retry_index", retry_index.to_string()),
        ]);

        self.send(
            self.http
                .get(format!("{}/1/clouddrive/task", self.endpoints.drive_pc))
                .query(&params),
        )
        .await
    }

    /// Resolve a finished share job into its public URL.
    pub async fn get_share_url(&self, share_id: &str) -> Result<ShareLinkInfo> {
        let envelope = self
            .send(
                self.http
                    .post(format!(
                        "{}/1/clouddrive/share/password",
                        self.endpoints.drive_pc
                    ))
                    .query(&common_params())
                    .json(&json!({ "share_id": share_id })),
            )
            .await?;

        envelope.into_data()
    }

    /// Request direct download URLs for files in the user's drive.
    pub async fn get_download_urls(&self, fids: &[String]) -> Result<Vec<DownloadItem>> {
        let envelope = self
            .send(
                self.http
                    .post(format!(
                        "{}/1/clouddrive/file/download",
                        self.endpoints.drive_pc
                    ))
                    .query(&common_params())
                    .json(&json!({ "fids": fids })),
            )
            .await?;

        envelope.into_data()
    }

    /// Stream a download URL to a local file, returning the number of bytes written.
    pub async fn download_file<P: AsRef<Path>>(&self, url: &str, destination: P) -> Result<u64> {
        let destination = destination.as_ref();

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(QuarkError::ApiError {
                code: status.as_u16() as i64,
                message: error_body,
            });
        }

        let progress = ProgressBar::new(response.content_length().unwrap_or(0));
        progress.set_style(
            ProgressStyle::with_template(
                "{msg:30!} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} {eta}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        progress.set_message(
            destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let mut file = File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.set_position(written);
        }

        file.flush().await?;
        progress.finish_and_clear();

        Ok(written)
    }
}

/// Query parameters attached to every drive API call.
///
/// `__dt` and `__t` are decoys the web client sends; the server only checks presence.
fn common_params() -> Vec<(&'static str, String)> {
    let dt: u32 = rand::thread_rng().gen_range(100..=9999);
    vec![
        ("pr", "ucpro".to_string()),
        ("fr", "pc".to_string()),
        ("uc_param_str", String::new()),
        ("__dt", dt.to_string()),
        ("__t", timestamp_millis().to_string()),
    ]
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_params_present() {
        let params = common_params();
        let keys: Vec<&str> = params.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["pr", "fr", "uc_param_str", "__dt", "__t"]);

        let dt: u32 = params[3].1.parse().unwrap();
        assert!((100..=9999).contains(&dt));
        assert!(params[4].1.len() >= 13);
    }

    #[test]
    fn test_endpoints_all_trims_slash() {
        let endpoints = Endpoints::all("http://127.0.0.1:1234/");
        assert_eq!(endpoints.drive_pc, "http://127.0.0.1:1234");
        assert_eq!(endpoints.drive, endpoints.pan);
    }
}
