use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use parley::prelude::*;

/// Runs a Parley chat server until Ctrl-C.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with server settings. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Socket address to accept requests on.
    #[arg(long)]
    bind: Option<String>,

    /// Added to a client's source port to find its callback listener.
    #[arg(long)]
    callback_offset: Option<u16>,

    /// Idle limit per connection, in milliseconds.
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Limit on each outbound push, in milliseconds.
    #[arg(long)]
    push_timeout_ms: Option<u64>,

    /// Outbound pushes allowed in flight at once.
    #[arg(long)]
    fanout_concurrency: Option<usize>,

    /// Reason sent to connected users on shutdown.
    #[arg(long)]
    shutdown_reason: Option<String>,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig, Box<dyn Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(offset) = self.callback_offset {
            config.callback_port_offset = offset;
        }
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        if let Some(ms) = self.push_timeout_ms {
            config.push_timeout_ms = ms;
        }
        if let Some(n) = self.fanout_concurrency {
            config.fanout_concurrency = n;
        }
        if let Some(reason) = &self.shutdown_reason {
            config.shutdown_reason = reason.clone();
        }
        Ok(config)
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.server_config()?;
    tracing::debug!(?config, "starting");

    let server = ParleyServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    if let Err(e) = server.run().await {
        tracing::warn!(error = %e, "server exited with error");
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "parleyd",
            "--bind",
            "127.0.0.1:7000",
            "--callback-offset",
            "5",
        ]);
        let config = cli.server_config().unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.callback_port_offset, 5);
        assert_eq!(config.push_timeout_ms, ServerConfig::default().push_timeout_ms);
    }

    #[test]
    fn test_flags_override_config_file() {
        let path = std::env::temp_dir().join(format!("parleyd-test-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"bind_addr": "127.0.0.1:8000", "fanout_concurrency": 4}"#)
            .unwrap();

        let cli = Cli::parse_from([
            "parleyd",
            "--config",
            path.to_str().unwrap(),
            "--bind",
            "127.0.0.1:9000",
        ]);
        let config = cli.server_config().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.fanout_concurrency, 4);
    }
}
