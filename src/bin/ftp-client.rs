//! Command-line FTP client
//!
//! One connection per invocation: log in, run a single subcommand, quit.

use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;

use ftp_engine::FtpClient;
use ftp_engine::transfer::{TransferMode, TransferType};

#[derive(Parser, Debug)]
#[command(name = "ftp-client", version, about = "Minimal FTP client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, default_value_t = 2121)]
    port: u16,

    #[arg(short, long)]
    user: String,

    #[arg(long, default_value = "")]
    password: String,

    /// Use PORT instead of PASV
    #[arg(long)]
    active: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List a directory
    Ls { path: Option<String> },
    /// Download a file
    Get {
        remote: String,
        /// Defaults to the remote file name
        local: Option<PathBuf>,
    },
    /// Upload a file
    Put {
        local: PathBuf,
        /// Defaults to the local file name
        remote: Option<String>,
    },
    /// Delete a file
    Rm { path: String },
    Mkdir { path: String },
    Rmdir { path: String },
    /// Print the working directory
    Pwd,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let mut client = FtpClient::connect((args.host.as_str(), args.port)).await?;
    if args.active {
        client.set_mode(TransferMode::Active);
    }
    client.login(&args.user, &args.password).await?;

    let result = run(&mut client, args.command).await;
    if let Err(e) = &result {
        error!("Command failed: {e}");
    }
    if let Err(e) = client.quit().await {
        info!("QUIT failed: {e}");
    }
    result
}

async fn run(client: &mut FtpClient, action: Action) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        Action::Ls { path } => {
            for line in client.list(path.as_deref()).await? {
                println!("{line}");
            }
        }
        Action::Get { remote, local } => {
            let local = local.unwrap_or_else(|| PathBuf::from(remote_file_name(&remote)));
            client.set_type(TransferType::Binary).await?;
            let mut file = tokio::fs::File::create(&local).await?;
            let bytes = client.retrieve_into(&remote, &mut file).await?;
            println!("{bytes} bytes received into {}", local.display());
        }
        Action::Put { local, remote } => {
            let remote = match remote {
                Some(r) => r,
                None => local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or("local path has no file name")?,
            };
            client.set_type(TransferType::Binary).await?;
            let mut file = tokio::fs::File::open(&local).await?;
            let bytes = client.store(&remote, &mut file).await?;
            println!("{bytes} bytes sent to {remote}");
        }
        Action::Rm { path } => client.delete(&path).await?,
        Action::Mkdir { path } => println!("{}", client.make_dir(&path).await?),
        Action::Rmdir { path } => client.remove_dir(&path).await?,
        Action::Pwd => println!("{}", client.pwd().await?),
    }
    Ok(())
}

fn remote_file_name(remote: &str) -> &str {
    remote.rsplit('/').find(|s| !s.is_empty()).unwrap_or(remote)
}
