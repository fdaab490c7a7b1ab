use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use drover_agent::agent::Agent;
use drover_agent::config::AgentConfig;
use drover_agent::isolation::ProcessIsolation;

#[derive(Parser, Debug)]
#[command(name = "drover-agent")]
#[command(about = "Worker-node agent for the Drover cluster scheduler")]
struct Args {
    /// Port the agent's message endpoint listens on
    #[arg(long, default_value = "5051")]
    port: u16,

    /// Port for the read-only introspection HTTP server (optional)
    #[arg(long)]
    http_port: Option<u16>,

    /// Master endpoint, host:port (optional; the agent waits otherwise)
    #[arg(long)]
    master: Option<String>,

    /// Total consumable resources, e.g. "cpus:4;mem:2048"
    #[arg(long, default_value = "cpus:1;mem:1024")]
    resources: String,

    /// Attributes of this machine, e.g. "rack:r1;zone:z2"
    #[arg(long, default_value = "")]
    attributes: String,

    /// Where to place framework work directories (default: $HOME/work)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Where to find Hadoop installed, for fetching executors from HDFS
    #[arg(long)]
    hadoop_home: Option<String>,

    /// Whether to run tasks as the user who submitted them
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    switch_user: bool,

    /// Directory prepended to relative executor URIs
    #[arg(long)]
    frameworks_home: Option<PathBuf>,

    /// Run in local mode (master in the same process group)
    #[arg(long)]
    local: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let http_addr: Option<SocketAddr> = match args.http_port {
        Some(p) => Some(format!("0.0.0.0:{p}").parse()?),
        None => None,
    };

    let mut conf = AgentConfig::new(listen_addr);
    conf.http_addr = http_addr;
    conf.master = args.master;
    conf.resources = args.resources;
    conf.attributes = args.attributes;
    conf.hadoop_home = args.hadoop_home;
    conf.switch_user = args.switch_user;
    conf.frameworks_home = args.frameworks_home;
    if let Some(work_dir) = args.work_dir {
        conf.work_dir = work_dir;
    }

    tracing::info!(
        listen_addr = %conf.listen_addr,
        http_addr = ?conf.http_addr,
        master = ?conf.master,
        resources = %conf.resources,
        "Starting drover-agent"
    );

    let shutdown = CancellationToken::new();
    let agent = Agent::new(conf, args.local);
    agent.run(Box::new(ProcessIsolation::new()), shutdown).await?;

    Ok(())
}
