//! quark_pan CLI - Save, download and share Quark Drive files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Select};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quark_pan::config::{DEFAULT_CONFIG_DIR, DEFAULT_SHARE_DIR};
use quark_pan::models::{ExpiryClass, Visibility, ROOT_NAME};
use quark_pan::poller::DEFAULT_MAX_ATTEMPTS;
use quark_pan::url_parser::load_url_file;
use quark_pan::{
    extract_folder_id, LoginCookies, PollConfig, QuarkClient, QuarkError, RunContext,
    SaveDirectoryConfig, ShareOptions, StateStore, TransferOutcome,
};

/// CLI tool for saving, downloading and sharing Quark Drive files.
#[derive(Parser)]
#[command(name = "quark_pan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding cookies.txt and save_dir.conf.
    #[arg(long, env = "QUARK_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR, global = true)]
    config_dir: PathBuf,

    /// Directory receiving share_url.txt and retry.txt.
    #[arg(long, env = "QUARK_SHARE_DIR", default_value = DEFAULT_SHARE_DIR, global = true)]
    share_dir: PathBuf,

    /// Cookie header to use instead of the saved login.
    #[arg(long, env = "QUARK_COOKIE", global = true, hide_env_values = true)]
    cookie: Option<String>,

    /// Maximum number of status checks per server-side task.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, global = true)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a browser cookie header as the login.
    Login,

    /// Show the logged-in account and the save destination.
    Whoami,

    /// Save one share link into the destination folder.
    Transfer {
        /// Share URL, optionally with `?pwd=<passcode>`.
        url: String,
    },

    /// Save every share link listed in a file.
    Batch {
        /// File with one share URL per line.
        #[arg(default_value = "url.txt")]
        file: PathBuf,
    },

    /// Download a share that is already in your drive.
    Download {
        /// Share URL.
        #[arg(required_unless_present = "file")]
        url: Option<String>,

        /// File with one share URL per line.
        #[arg(long, short = 'f', conflicts_with = "url")]
        file: Option<PathBuf>,

        /// Local destination directory.
        #[arg(long, short = 't', default_value = "downloads")]
        to: PathBuf,
    },

    /// Create a folder in the drive root and save into it from now on.
    Mkdir {
        name: String,
    },

    /// Choose the destination folder for saved shares.
    SwitchDir {
        /// Folder URL or ID. Prompts with the root folders when omitted.
        folder: Option<String>,
    },

    /// Create share links for every folder two levels below a drive folder.
    Share {
        /// Folder URL or ID (`0` for the drive root).
        #[arg(default_value = "0")]
        folder: String,

        #[command(flatten)]
        options: ShareArgs,
    },

    /// Retry the folders recorded as failed by the last `share` run.
    RetryShares {
        #[command(flatten)]
        options: ShareArgs,
    },
}

#[derive(clap::Args)]
struct ShareArgs {
    #[arg(long, value_enum, default_value_t = Visibility::Public)]
    visibility: Visibility,

    #[arg(long, value_enum, default_value_t = ExpiryClass::Permanent)]
    expiry: ExpiryClass,

    /// Passcode for private shares. Generated when omitted.
    #[arg(long)]
    passcode: Option<String>,
}

impl From<ShareArgs> for ShareOptions {
    fn from(args: ShareArgs) -> Self {
        ShareOptions {
            visibility: args.visibility,
            expiry: args.expiry,
            passcode: args.passcode,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quark_pan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<QuarkError>() {
            Some(quark) if quark.is_fatal() => {
                error!("{}", quark);
                acknowledge_and_exit();
            }
            _ => {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Keep the failure on screen until the user confirms, then exit.
fn acknowledge_and_exit() -> ! {
    let prompt = format!(
        "[{}] Task failed and the run was stopped. Press Enter to exit",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    let _ = Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text();
    std::process::exit(1);
}

async fn run(cli: Cli) -> Result<()> {
    let store = StateStore::new(&cli.config_dir, &cli.share_dir);

    if let Commands::Login = cli.command {
        return login(&store, cli.cookie).await;
    }

    let cookies = match &cli.cookie {
        Some(header) => LoginCookies::from_header(header)?,
        None => LoginCookies::from_file(store.cookie_path())
            .with_context(|| format!("Failed to load login from {:?}", store.cookie_path()))?,
    };
    let client = QuarkClient::new(&cookies)?;

    let nickname = client.get_user_info().await?;
    let destination = store.load_save_dir()?;
    info!("Logged in as {}", nickname);
    info!(
        "Save destination: {} ({})",
        destination.dir_name, destination.pdir_id
    );

    let poll = PollConfig::default().with_max_attempts(cli.max_attempts);
    let mut ctx = RunContext::new(client, store, destination, poll);

    match cli.command {
        // Handled before the client is built.
        Commands::Login => {}

        Commands::Whoami => {
            println!("Account:     {}", nickname);
            println!(
                "Destination: {} ({})",
                ctx.destination().dir_name,
                ctx.destination().pdir_id
            );
        }

        Commands::Transfer { url } => match ctx.transfer(&url).await? {
            TransferOutcome::RetriesExhausted { task_id } => {
                warn!("Task {} is still running, check your drive later", task_id);
            }
            outcome => info!("Done: {:?}", outcome),
        },

        Commands::Batch { file } => {
            let urls = load_url_file(&file)
                .with_context(|| format!("Failed to read share list {:?}", file))?;
            if urls.is_empty() {
                anyhow::bail!("No share URLs found in {:?}", file);
            }
            ctx.transfer_batch(&urls).await?;
        }

        Commands::Download { url, file, to } => {
            let urls = match (url, file) {
                (Some(url), _) => vec![url],
                (None, Some(file)) => load_url_file(&file)
                    .with_context(|| format!("Failed to read share list {:?}", file))?,
                (None, None) => Vec::new(),
            };

            for url in &urls {
                match ctx.download(url, &to).await {
                    Ok(summary) => info!(
                        "{} file(s) from {} folder(s) saved under {:?}",
                        summary.files, summary.folders, to
                    ),
                    Err(e) if urls.len() > 1 => warn!("Skipping {}: {}", url.trim(), e),
                    Err(e) => return Err(e.into()),
                }
            }
        }

        Commands::Mkdir { name } => {
            ctx.create_folder(&name).await?;
        }

        Commands::SwitchDir { folder } => {
            let config = match folder {
                Some(folder) => {
                    let pdir_id = extract_folder_id(&folder)?;
                    match SaveDirectoryConfig::well_known(&pdir_id) {
                        Some(config) => config,
                        None => prompt_folder_name(pdir_id)?,
                    }
                }
                None => choose_root_folder(ctx.client()).await?,
            };
            ctx.set_destination(config)?;
        }

        Commands::Share { folder, options } => {
            let pdir_fid = extract_folder_id(&folder)?;
            ctx.share_folders(&pdir_fid, &options.into()).await?;
        }

        Commands::RetryShares { options } => {
            ctx.retry_shares(&options.into()).await?;
        }
    }

    Ok(())
}

async fn login(store: &StateStore, cookie: Option<String>) -> Result<()> {
    let header = match cookie {
        Some(header) => header,
        None => Input::<String>::new()
            .with_prompt("Paste the Cookie header from a logged-in browser session")
            .interact_text()?,
    };

    let cookies = LoginCookies::from_header(&header)?;
    let client = QuarkClient::new(&cookies)?;
    let nickname = client.get_user_info().await?;

    cookies.save(store.cookie_path())?;
    info!(
        "Logged in as {}, {} cookie(s) saved to {:?}",
        nickname,
        cookies.len(),
        store.cookie_path()
    );
    Ok(())
}

/// Ask for a display name for a folder given by id.
fn prompt_folder_name(pdir_id: String) -> Result<SaveDirectoryConfig> {
    let dir_name = Input::<String>::new()
        .with_prompt("Folder name")
        .default(pdir_id.clone())
        .interact_text()?;
    Ok(SaveDirectoryConfig { pdir_id, dir_name })
}

/// Let the user pick one of the drive's top-level folders, or the root itself.
async fn choose_root_folder(client: &QuarkClient) -> Result<SaveDirectoryConfig> {
    let folders = client.list_root_folders().await?;

    let mut items = vec![format!("/ ({})", ROOT_NAME)];
    items.extend(folders.iter().map(|f| f.file_name.clone()));

    let selection = Select::new()
        .with_prompt("Save shares into")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(match selection {
        0 => SaveDirectoryConfig::root(),
        n => SaveDirectoryConfig {
            pdir_id: folders[n - 1].fid.clone(),
            dir_name: folders[n - 1].file_name.clone(),
        },
    })
}
