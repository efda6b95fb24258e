//! Commands run against one logged-in account: transfer, download, folder
//! management and bulk sharing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{error, info, warn};

use crate::client::QuarkClient;
use crate::config::StateStore;
use crate::error::{QuarkError, Result};
use crate::models::{
    format_size, RetryRecord, SaveDirectoryConfig, ShareDetail, ShareEntry, ShareOptions,
    SharePageSession, ShareRecord, ShareRequest, TaskResult, Visibility, ROOT_FID,
};
use crate::poller::{poll_until_done, PollConfig};
use crate::url_parser::parse_share_url;
use crate::walker::{expand, for_each_directory, DriveDirectoryLister, ListDirectory, ShareDirectoryLister};

/// Number of fids per download-URL request.
const DOWNLOAD_BATCH: usize = 50;

/// Length of generated passcodes for private shares.
const PASSCODE_LEN: usize = 4;

/// Retry budget and pauses for creating one share.
#[derive(Debug, Clone)]
pub struct ShareSettings {
    pub attempts: u32,
    /// One of these is picked at random before every attempt.
    pub pauses: Vec<Duration>,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            pauses: [500, 1000, 1500, 2000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

impl ShareSettings {
    fn pause(&self) -> Duration {
        self.pauses
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Saved { folder_name: String },
    /// The share already belongs to this account; nothing was submitted.
    AlreadyOwned,
    EmptyShare,
    /// The job was accepted but did not finish within the poll budget.
    RetriesExhausted { task_id: String },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub files: usize,
    pub folders: usize,
    pub bytes: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShareSummary {
    pub shared: usize,
    pub failed: usize,
}

/// State for one run: the API client, the save destination and persisted files.
pub struct RunContext {
    client: QuarkClient,
    store: StateStore,
    destination: SaveDirectoryConfig,
    poll: PollConfig,
    share: ShareSettings,
}

impl RunContext {
    pub fn new(
        client: QuarkClient,
        store: StateStore,
        destination: SaveDirectoryConfig,
        poll: PollConfig,
    ) -> Self {
        Self {
            client,
            store,
            destination,
            poll,
            share: ShareSettings::default(),
        }
    }

    pub fn with_share_settings(mut self, share: ShareSettings) -> Self {
        self.share = share;
        self
    }

    pub fn client(&self) -> &QuarkClient {
        &self.client
    }

    pub fn destination(&self) -> &SaveDirectoryConfig {
        &self.destination
    }

    /// Resolve a share URL and list its top level.
    async fn open_share(&self, url: &str) -> Result<(SharePageSession, ShareDetail)> {
        info!("Share link: {}", url.trim());
        let link = parse_share_url(url)?;
        let stoken = self.client.get_stoken(&link).await?;
        let session = SharePageSession {
            pwd_id: link.pwd_id,
            stoken,
        };
        let detail = self.client.get_share_detail(&session, ROOT_FID).await?;
        Ok((session, detail))
    }

    /// Save the contents of one share into the destination folder.
    pub async fn transfer(&self, url: &str) -> Result<TransferOutcome> {
        let (session, detail) = self.open_share(url).await?;
        if detail.entries.is_empty() {
            warn!("Share is empty, nothing to save");
            return Ok(TransferOutcome::EmptyShare);
        }
        log_share_summary(&detail.entries);

        if self.destination.pdir_id.trim().is_empty() {
            return Err(QuarkError::MissingDestination);
        }
        if detail.is_owner {
            info!("These files are already in your drive, skipping");
            return Ok(TransferOutcome::AlreadyOwned);
        }

        let fid_list: Vec<String> = detail.entries.iter().map(|e| e.fid.clone()).collect();
        let token_list: Vec<String> = detail
            .entries
            .iter()
            .map(|e| e.share_fid_token.clone())
            .collect();

        let task_id = self
            .client
            .submit_transfer(&session, &fid_list, &token_list, &self.destination.pdir_id)
            .await?;

        match poll_until_done(&self.client, &task_id, &self.poll).await? {
            TaskResult::Completed {
                destination_folder_name,
                ..
            } => {
                info!("Saved into \"{}\"", destination_folder_name);
                Ok(TransferOutcome::Saved {
                    folder_name: destination_folder_name,
                })
            }
            TaskResult::RetriesExhausted { .. } => Ok(TransferOutcome::RetriesExhausted { task_id }),
            outcome => Err(QuarkError::FatalTask { task_id, outcome }),
        }
    }

    /// Transfer several shares one after another.
    ///
    /// Per-share failures are logged and skipped; a fatal task outcome stops the batch.
    pub async fn transfer_batch(&self, urls: &[String]) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();

        for (idx, url) in urls.iter().enumerate() {
            info!("Transferring share {}/{}", idx + 1, urls.len());
            match self.transfer(url).await {
                Ok(TransferOutcome::Saved { .. }) => summary.succeeded += 1,
                Ok(TransferOutcome::RetriesExhausted { task_id }) => {
                    warn!("Task {} did not finish, retry this share later", task_id);
                    summary.failed += 1;
                }
                Ok(_) => summary.skipped += 1,
                Err(e) if e.is_fatal() => {
                    error!(
                        "Stopping batch: {} share(s) were already saved before this failure",
                        summary.succeeded
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", url.trim(), e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Batch finished: {} saved, {} skipped, {} failed",
            summary.succeeded, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    /// Download every file of an owned share below `target_root`.
    pub async fn download(&self, url: &str, target_root: &Path) -> Result<DownloadSummary> {
        let (session, detail) = self.open_share(url).await?;
        let mut summary = DownloadSummary::default();
        if detail.entries.is_empty() {
            warn!("Share is empty, nothing to download");
            return Ok(summary);
        }
        if !detail.is_owner {
            return Err(QuarkError::NotOwner);
        }

        let lister = ShareDirectoryLister::new(&self.client, &session);
        let walk = expand(&lister, &detail.entries).await?;
        summary.folders = walk.folders_count;
        let total = walk.files.len();

        for chunk in walk.files.chunks(DOWNLOAD_BATCH) {
            let fids: Vec<String> = chunk.iter().map(|f| f.entry.fid.clone()).collect();
            let items = self.client.get_download_urls(&fids).await?;

            for item in items {
                let Some(file) = chunk.iter().find(|f| f.entry.fid == item.fid) else {
                    warn!("Unexpected download entry {} ({})", item.file_name, item.fid);
                    continue;
                };

                let dir = local_dir(target_root, &file.folder_path);
                tokio::fs::create_dir_all(&dir).await?;
                let path = dir.join(sanitize_component(&item.file_name));

                info!(
                    "Downloading file {}/{}: {}",
                    summary.files + 1,
                    total,
                    path.display()
                );
                summary.bytes += self.client.download_file(&item.download_url, &path).await?;
                summary.files += 1;
            }
        }

        info!(
            "Downloaded {} file(s), {}",
            summary.files,
            format_size(summary.bytes)
        );
        Ok(summary)
    }

    /// Create a folder in the drive root and make it the save destination.
    pub async fn create_folder(&mut self, name: &str) -> Result<SaveDirectoryConfig> {
        let fid = self.client.create_dir(name).await?;
        info!("Created folder \"{}\" in the drive root", name);

        let config = SaveDirectoryConfig {
            pdir_id: fid,
            dir_name: name.to_string(),
        };
        self.set_destination(config.clone())?;
        Ok(config)
    }

    /// Persist and switch the save destination.
    pub fn set_destination(&mut self, config: SaveDirectoryConfig) -> Result<()> {
        self.store.store_save_dir(&config)?;
        info!("Save destination is now \"{}\"", config.dir_name);
        self.destination = config;
        Ok(())
    }

    /// Share every folder two levels below `pdir_fid`.
    ///
    /// Results go to the share URL file; folders that could not be shared are
    /// appended to the retry ledger.
    pub async fn share_folders(&self, pdir_fid: &str, options: &ShareOptions) -> Result<ShareSummary> {
        self.store.reset_share_output()?;

        let lister = DriveDirectoryLister::new(&self.client);
        let roots = lister.list_children(pdir_fid).await?;

        let mut targets: Vec<RetryRecord> = Vec::new();
        for_each_directory(&lister, &roots, |parent, child| {
            let index = targets.len() + 1;
            targets.push(RetryRecord {
                index,
                parent_name: parent.to_string(),
                folder_name: child.file_name.clone(),
                fid: child.fid.clone(),
            });
        })
        .await?;
        info!("Found {} folder(s) to share", targets.len());

        let mut summary = ShareSummary::default();
        for record in &targets {
            match self.share_with_retries(record, options).await {
                Ok(true) => summary.shared += 1,
                Ok(false) => {
                    self.store.append_retry_record(record)?;
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(
                        "Stopping: {} folder(s) were already shared before this failure",
                        summary.shared
                    );
                    return Err(e);
                }
            }
        }

        info!(
            "Shared {} folder(s), links saved to {}",
            summary.shared,
            self.store.share_url_path().display()
        );
        if summary.failed > 0 {
            warn!(
                "{} folder(s) failed, recorded in {}",
                summary.failed,
                self.store.retry_path().display()
            );
        }
        Ok(summary)
    }

    /// Re-run the share attempts recorded in the retry ledger.
    pub async fn retry_shares(&self, options: &ShareOptions) -> Result<ShareSummary> {
        let records = self.store.load_retry_ledger()?;
        let mut summary = ShareSummary::default();
        if records.is_empty() {
            info!("Retry ledger is empty");
            return Ok(summary);
        }
        info!("Retrying {} share(s)", records.len());

        let mut remaining = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            match self.share_with_retries(record, options).await {
                Ok(true) => summary.shared += 1,
                Ok(false) => {
                    remaining.push(record.clone());
                    summary.failed += 1;
                }
                Err(e) => {
                    remaining.extend(records[idx..].iter().cloned());
                    self.store.write_retry_ledger(&remaining)?;
                    return Err(e);
                }
            }
        }

        self.store.write_retry_ledger(&remaining)?;
        info!(
            "Retry finished: {} shared, {} still failing",
            summary.shared, summary.failed
        );
        Ok(summary)
    }

    /// Returns `Ok(false)` when every attempt failed with a non-fatal error.
    async fn share_with_retries(&self, record: &RetryRecord, options: &ShareOptions) -> Result<bool> {
        let mut last_error = None;

        for attempt in 1..=self.share.attempts {
            tokio::time::sleep(self.share.pause()).await;
            info!(
                "{}. Sharing {}/{} (attempt {})",
                record.index, record.parent_name, record.folder_name, attempt
            );

            match self.share_one(record, options).await {
                Ok(share_url) => {
                    self.store.append_share_record(&ShareRecord {
                        index: record.index,
                        parent_name: record.parent_name.clone(),
                        folder_name: record.folder_name.clone(),
                        share_url,
                    })?;
                    info!(
                        "{}. Shared {}/{}",
                        record.index, record.parent_name, record.folder_name
                    );
                    return Ok(true);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{}. Attempt {} failed: {}", record.index, attempt, e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            error!(
                "{}. Giving up on {}/{}: {}",
                record.index, record.parent_name, record.folder_name, e
            );
        }
        Ok(false)
    }

    async fn share_one(&self, record: &RetryRecord, options: &ShareOptions) -> Result<String> {
        let passcode = match options.visibility {
            Visibility::Public => None,
            Visibility::Private => Some(
                options
                    .passcode
                    .clone()
                    .unwrap_or_else(generate_passcode),
            ),
        };
        let request = ShareRequest {
            fid_list: vec![record.fid.clone()],
            title: record.folder_name.clone(),
            url_type: options.visibility.url_type(),
            expired_type: options.expiry.expired_type(),
            passcode,
        };

        let task_id = self.client.submit_share(&request).await?;
        match poll_until_done(&self.client, &task_id, &self.poll).await? {
            TaskResult::Completed {
                share_id: Some(share_id),
                ..
            } => Ok(self.client.get_share_url(&share_id).await?.share_url),
            TaskResult::Completed { share_id: None, .. } => Err(QuarkError::ApiError {
                code: 0,
                message: format!("share task {} finished without a share id", task_id),
            }),
            TaskResult::RetriesExhausted { attempts } => {
                Err(QuarkError::TaskPending { task_id, attempts })
            }
            outcome => Err(QuarkError::FatalTask { task_id, outcome }),
        }
    }
}

/// Log counts and names of the top-level entries, in server order.
fn log_share_summary(entries: &[ShareEntry]) {
    let (folders, files): (Vec<&ShareEntry>, Vec<&ShareEntry>) =
        entries.iter().partition(|e| e.is_dir);
    info!(
        "Entries: {}, files: {}, folders: {}",
        entries.len(),
        files.len(),
        folders.len()
    );
    info!(
        "Files: {:?}",
        files.iter().map(|e| e.file_name.as_str()).collect::<Vec<_>>()
    );
    info!(
        "Folders: {:?}",
        folders.iter().map(|e| e.file_name.as_str()).collect::<Vec<_>>()
    );
}

fn generate_passcode() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSCODE_LEN)
        .map(char::from)
        .collect()
}

/// Local directory for a remote folder path.
fn local_dir(root: &Path, folder_path: &[String]) -> PathBuf {
    folder_path
        .iter()
        .fold(root.to_path_buf(), |dir, name| dir.join(sanitize_component(name)))
}

/// Make a remote name safe to use as one local path component.
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
