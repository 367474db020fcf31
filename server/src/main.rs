use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use runcell_core::ExecConfig;
use runcell_core::SessionRegistry;

#[derive(Debug, Parser)]
#[command(name = "runcell-server")]
#[command(about = "Interactive code execution server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Interpreter binary used to run submitted code.
    #[arg(long, default_value = "python3")]
    interpreter: PathBuf,

    /// Directory for per-run instrumented source files; defaults to the
    /// system temp directory.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let args = Args::parse();

    let mut config = ExecConfig {
        interpreter: args.interpreter,
        ..Default::default()
    };
    if let Some(dir) = args.scratch_dir {
        config.scratch_dir = dir;
    }

    let registry = SessionRegistry::new(config);
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(listen = %args.listen, "runcell server listening");
    runcell_server::serve(listener, registry).await?;
    Ok(())
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
