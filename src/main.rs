//! `sftpx`: file operations against a remote host over SFTP.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, error};

use sftpx::config::query_ssh_config;
use sftpx::{
    AppError, ConfigManager, Connection, EntryFilter, Executor, ExecutorSettings, RemoteFile,
    Result, SftpFileSystem, WriteDisposition, init_tracing,
};

const PASSWORD_ENV: &str = "SFTPX_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "sftpx", about = "File operations over SFTP", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Settings file (default: <config dir>/sftpx/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host name or ~/.ssh/config alias, overrides the settings file.
    #[arg(long, global = true)]
    host: Option<String>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct FilterArgs {
    /// Only names ending with this suffix.
    #[arg(long)]
    suffix: Option<String>,

    /// Only names containing this text.
    #[arg(long)]
    contains: Option<String>,

    /// Only names matching this regular expression.
    #[arg(long)]
    regex: Option<String>,
}

impl FilterArgs {
    fn build(&self) -> Result<Option<EntryFilter>> {
        if let Some(suffix) = &self.suffix {
            return Ok(Some(EntryFilter::suffix(suffix)));
        }
        if let Some(needle) = &self.contains {
            return Ok(Some(EntryFilter::contains(needle)));
        }
        self.regex.as_deref().map(EntryFilter::regex).transpose()
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory.
    Ls {
        path: String,
        #[arg(short, long)]
        recursive: bool,
        /// Include directories in the output.
        #[arg(long)]
        dirs: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show metadata of a path.
    Stat { path: String },

    /// Print a remote file to stdout.
    Cat {
        path: String,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long)]
        length: Option<u64>,
    },

    /// Download a file.
    Get { remote: String, local: PathBuf },

    /// Upload a file.
    Put {
        local: PathBuf,
        remote: String,
        #[arg(long, conflicts_with = "resume")]
        append: bool,
        /// Continue after the bytes already on the remote side.
        #[arg(long)]
        resume: bool,
    },

    /// Create a directory.
    Mkdir {
        path: String,
        /// Create missing parents too.
        #[arg(short, long)]
        parents: bool,
    },

    /// Remove a file or empty directory.
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Move or rename.
    Mv { source: String, target: String },

    /// Create a link at `target` pointing to `source`.
    Ln {
        source: String,
        target: String,
        #[arg(long)]
        hard: bool,
    },

    /// Change permission bits, given in octal.
    Chmod { mode: String, path: String },

    /// Create a file if it does not exist.
    Touch { path: String },

    /// Upload a local directory tree.
    PushDir {
        local: PathBuf,
        remote: String,
        /// Only the top level.
        #[arg(long)]
        flat: bool,
    },

    /// Download a remote directory tree.
    PullDir {
        remote: String,
        local: PathBuf,
        #[arg(long)]
        flat: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn load_settings(cli: &Cli) -> Result<(Connection, ExecutorSettings)> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    let mut config = manager.config().clone();

    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
        match query_ssh_config(host) {
            Ok(entry) => config.connection.apply_ssh_config(entry),
            Err(e) => debug!("no ssh config entry for {}: {}", host, e),
        }
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        config.connection.password = Some(password);
    }

    config.connection.validate()?;
    config.executor.validate()?;
    Ok((config.connection, config.executor))
}

fn describe(file: &RemoteFile) -> String {
    let size = file
        .size()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mtime = file
        .modify_time()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!(
        "{} {:>5} {:>5} {:>10} {} {}",
        file.permission_string(),
        file.uid().unwrap_or(0),
        file.gid().unwrap_or(0),
        size,
        mtime,
        file.path()
    )
}

async fn execute(exec: &Executor<SftpFileSystem>, command: Command) -> Result<()> {
    match command {
        Command::Ls {
            path,
            recursive,
            dirs,
            filter,
        } => {
            let entries = match filter.build()? {
                Some(filter) => {
                    exec.list_files_filtered(&path, &filter, recursive, dirs)
                        .await?
                }
                None if !recursive && dirs => exec.list(&path).await?,
                None => exec.list_files(&path, recursive, dirs).await?,
            };
            for entry in &entries {
                println!("{}", describe(entry));
            }
        }
        Command::Stat { path } => {
            let file = exec
                .file(&path)
                .await?
                .ok_or_else(|| AppError::NotFound(path.clone()))?;
            println!("{}", describe(&file));
            if file.is_link_file()
                && let Some(target) = exec.link_target(&path).await?
            {
                println!("-> {target}");
            }
        }
        Command::Cat { path, skip, length } => {
            let mut request = exec.transfer_request().skip(skip);
            request.max_length = length;
            let mut stdout = tokio::io::stdout();
            exec.download_to(&path, &mut stdout, &request).await?;
        }
        Command::Get { remote, local } => {
            let n = exec
                .download_file(&remote, &local, &exec.transfer_request())
                .await?;
            println!("{n} bytes");
        }
        Command::Put {
            local,
            remote,
            append,
            resume,
        } => {
            let n = if resume {
                exec.upload_resume(&local, &remote).await?
            } else {
                let disposition = if append {
                    WriteDisposition::Append
                } else {
                    WriteDisposition::Overwrite
                };
                exec.upload_file(&local, &remote, disposition).await?
            };
            println!("{n} bytes");
        }
        Command::Mkdir { path, parents } => {
            if parents {
                exec.make_directories(&path).await?;
            } else {
                exec.make_directory(&path).await?;
            }
        }
        Command::Rm { path, recursive } => {
            if recursive {
                exec.remove_recursive(&path).await?;
            } else {
                exec.remove(&path).await?;
            }
        }
        Command::Mv { source, target } => exec.move_to(&source, &target).await?,
        Command::Ln {
            source,
            target,
            hard,
        } => exec.link(&source, &target, hard).await?,
        Command::Chmod { mode, path } => {
            let mode = u32::from_str_radix(&mode, 8)
                .map_err(|e| AppError::ValidationError(format!("Invalid mode '{mode}': {e}")))?;
            exec.change_mode(&path, mode).await?;
        }
        Command::Touch { path } => exec.touch(&path).await?,
        Command::PushDir {
            local,
            remote,
            flat,
        } => {
            let summary = exec.upload_dir(&remote, &local, !flat).await?;
            println!(
                "{} directories, {} files, {} bytes",
                summary.directories, summary.files, summary.bytes
            );
        }
        Command::PullDir {
            remote,
            local,
            flat,
            filter,
        } => {
            let filter = filter.build()?;
            let summary = exec
                .download_dir(&remote, &local, !flat, filter.as_ref())
                .await?;
            println!(
                "{} directories, {} files, {} bytes",
                summary.directories, summary.files, summary.bytes
            );
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let (connection, settings) = load_settings(&cli)?;
    let session = Arc::new(SftpFileSystem::new(connection));
    let mut exec = Executor::new(session, settings);
    exec.connect().await?;

    let result = execute(&exec, cli.command).await;
    let closed = exec.close().await;
    result?;
    closed
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("sftpx: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("sftpx: {e}");
            ExitCode::FAILURE
        }
    }
}
