use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use novalxd_session::config::DEFAULT_SOCKET;
use novalxd_session::{
    AliasRequest, Endpoint, Instance, PublishRequest, Session, SessionConfig, SnapshotRequest,
};

#[derive(Parser)]
#[command(name = "novalxd-session")]
#[command(about = "Drive the nova-lxd session layer against an LXD daemon")]
struct Args {
    /// LXD unix socket
    #[arg(short, long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    /// HTTP endpoint to use instead of the unix socket (e.g. http://127.0.0.1:8443)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Operation status code that counts as success
    #[arg(long, default_value = "200")]
    expected_status: u16,

    /// Delay between operation polls in milliseconds
    #[arg(long, default_value = "500")]
    poll_interval_ms: u64,

    /// Bound for snapshot and publish operations in seconds
    #[arg(long, default_value = "600")]
    snapshot_timeout_secs: u64,

    /// Bound for operation-wait in seconds (waits indefinitely if unset)
    #[arg(long)]
    wait_timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List profile names
    ProfileList,
    /// Delete an instance's profile
    ProfileDelete { instance: String },
    /// Check whether an instance's image alias exists
    ImageDefined {
        instance: String,
        #[arg(long)]
        image_ref: String,
    },
    /// Create an image alias
    CreateAlias {
        instance: String,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        fingerprint: String,
    },
    /// Snapshot an instance's container
    Snapshot {
        instance: String,
        name: String,
        #[arg(long)]
        stateful: bool,
    },
    /// Publish an instance's container as an image
    Publish {
        instance: String,
        #[arg(long)]
        alias: String,
        #[arg(long)]
        public: bool,
    },
    /// Wait for a background operation
    OperationWait {
        instance: String,
        operation_id: String,
    },
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let endpoint = match &self.endpoint {
            Some(url) => Endpoint::Http(url.clone()),
            None => Endpoint::Unix(self.socket.clone()),
        };
        SessionConfig {
            endpoint,
            expected_status: self.expected_status,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            snapshot_timeout: Duration::from_secs(self.snapshot_timeout_secs),
            operation_wait_timeout: self.wait_timeout_secs.map(Duration::from_secs),
        }
    }
}

fn instance(name: &str, image_ref: &str) -> Result<Instance> {
    Instance::new(name, "", image_ref).context("invalid instance")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("novalxd_session=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = args.session_config();

    info!(endpoint = ?config.endpoint, "Connecting to LXD");
    let session = Session::connect(config);

    match args.command {
        Command::ProfileList => {
            for name in session.profile_list().await? {
                println!("{}", name);
            }
        }
        Command::ProfileDelete { instance: name } => {
            session.profile_delete(&instance(&name, "")?).await?;
        }
        Command::ImageDefined {
            instance: name,
            image_ref,
        } => {
            let defined = session.image_defined(&instance(&name, &image_ref)?).await?;
            println!("{}", defined);
        }
        Command::CreateAlias {
            instance: name,
            alias,
            fingerprint,
        } => {
            let alias = AliasRequest::new(alias, fingerprint)?;
            let created = session.create_alias(&alias, &instance(&name, "")?).await?;
            println!("{}", created);
        }
        Command::Snapshot {
            instance: name,
            name: snapshot,
            stateful,
        } => {
            let snapshot = SnapshotRequest::new(snapshot, stateful)?;
            session
                .container_snapshot(&snapshot, &instance(&name, "")?)
                .await?;
        }
        Command::Publish {
            instance: name,
            alias,
            public,
        } => {
            let image = PublishRequest::new(name.clone(), alias, public)?;
            let exported = session
                .container_publish(&image, &instance(&name, "")?)
                .await?;
            println!("{}", exported);
        }
        Command::OperationWait {
            instance: name,
            operation_id,
        } => {
            session
                .operation_wait(&operation_id, &instance(&name, "")?)
                .await?;
        }
    }

    Ok(())
}
