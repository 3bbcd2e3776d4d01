use anyhow::{Context, Result};
use clap::Parser;
use edgelink::cli::{Cli, Commands, Config, ConfigCommand};
use edgelink::{EdgeData, EdgeError, EdgeEvent, EdgeHandle};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, caps } => {
            let config = Config::load_or_create_default()?;
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            let caps = caps.unwrap_or_else(|| config.caps.clone());
            run_serve(&config, &bind, &caps).await?;
        }
        Commands::Connect { address, send } => {
            let config = Config::load_or_create_default()?;
            run_connect(&config, &address, send).await?;
        }
        Commands::Config { command } => match command {
            ConfigCommand::Path => {
                println!("{}", Config::default_config_file()?.display());
            }
            ConfigCommand::Show => {
                let config = Config::load_or_create_default()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
        },
    }

    Ok(())
}

fn split_address(address: &str) -> Result<(String, u16)> {
    let (ip, port) = address
        .rsplit_once(':')
        .with_context(|| format!("Address must be ip:port, got '{}'", address))?;
    let port = port
        .parse()
        .with_context(|| format!("Invalid port in address '{}'", address))?;
    Ok((ip.to_string(), port))
}

/// Run a listening node that echoes every received payload back to its sender.
async fn run_serve(config: &Config, bind: &str, caps: &str) -> Result<()> {
    let (ip, port) = split_address(bind)?;

    let node_id = format!("edgelink-{}", std::process::id());
    let handle = EdgeHandle::new(&node_id, &config.topic)?;
    handle.set_info("IP", &ip).await?;
    handle.set_info("PORT", &port.to_string()).await?;
    handle.set_info("CAPS", caps).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EdgeData>();
    handle
        .set_event_callback(move |event| match event {
            EdgeEvent::Capability { caps } => {
                info!(%caps, "Peer capability accepted");
                Ok(())
            }
            EdgeEvent::NewDataReceived { data } => tx
                .send(data)
                .map_err(|_| EdgeError::connection("Event channel closed")),
            EdgeEvent::CallbackReleased => Ok(()),
        })
        .await?;

    handle.start(true).await?;
    let port = handle.port().await?;
    info!(port, "Serving; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = rx.recv() => {
                let Some(data) = received else { break };
                let sizes: Vec<usize> = (0..data.count())
                    .filter_map(|i| data.buffer(i).map(|b| b.len()))
                    .collect();
                info!(buffers = data.count(), ?sizes, "Received payload, echoing back");
                if let Err(e) = handle.respond(&data).await {
                    error!(error = %e, "Failed to echo payload");
                }
            }
        }
    }

    handle.release().await?;
    Ok(())
}

/// Connect to a node, push the given payloads and print the responses.
async fn run_connect(config: &Config, address: &str, payloads: Vec<String>) -> Result<()> {
    let (ip, port) = split_address(address)?;

    let node_id = format!("edgelink-{}", std::process::id());
    let handle = EdgeHandle::new(&node_id, &config.topic)?;
    handle.set_info("IP", "127.0.0.1").await?;
    handle.set_info("PORT", "0").await?;
    handle.set_info("CAPS", &config.caps).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<EdgeData>();
    let own_caps = config.caps.clone();
    handle
        .set_event_callback(move |event| match event {
            EdgeEvent::Capability { caps } => {
                if caps == own_caps {
                    info!(%caps, "Peer capability matches");
                    Ok(())
                } else {
                    warn!(%caps, expected = %own_caps, "Peer capability mismatch");
                    Err(EdgeError::connection("Incompatible capability"))
                }
            }
            EdgeEvent::NewDataReceived { data } => tx
                .send(data)
                .map_err(|_| EdgeError::connection("Event channel closed")),
            EdgeEvent::CallbackReleased => Ok(()),
        })
        .await?;

    // The listener must be up before connecting: the server dials back to it
    // to complete the duplex channel.
    handle.start(false).await?;
    handle.connect(&ip, port).await?;
    info!(address, "Connected");

    let expected = payloads.len();
    for payload in payloads {
        let mut data = EdgeData::new();
        data.add_bytes(payload.into_bytes())?;
        handle.request(&data).await?;
    }

    let mut received = 0;
    while received < expected {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                warn!("Timed out waiting for responses");
                break;
            }
            response = rx.recv() => {
                let Some(data) = response else { break };
                received += 1;
                for i in 0..data.count() {
                    if let Some(bytes) = data.buffer(i) {
                        match std::str::from_utf8(bytes) {
                            Ok(text) => info!(buffer = i, text, "Response"),
                            Err(_) => info!(buffer = i, len = bytes.len(), "Response (binary)"),
                        }
                    }
                }
            }
        }
    }

    handle.release().await?;
    Ok(())
}
