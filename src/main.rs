#![warn(clippy::pedantic)]

use anyhow::Context;
use clap::Parser;
use media_session_bridge::{
    config::{Cli, Config},
    host::{self, Messenger},
    plugin,
};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    signal,
    sync::mpsc,
};

#[macro_use]
extern crate log;

async fn write_line(stdout: &mut io::Stdout, line: &str) -> anyhow::Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout
        .flush()
        .await
        .with_context(|| "Failed to write to the host channel")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity.log_level().unwrap_or(log::Level::Error);
    simple_logger::init_with_level(verbosity).unwrap();

    let config = Config::new(cli);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let mut messenger = Messenger::new();
    plugin::register_with_registrar(&mut messenger, &config, outbound_tx);

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::pin!(ctrl_c, terminate);

    let mut frames = BufReader::new(io::stdin()).split(b'\n');
    let mut stdout = io::stdout();

    let result = loop {
        tokio::select! {
            frame = frames.next_segment() => {
                let frame = match frame {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        info!("Host closed the channel");
                        break Ok(());
                    }
                    Err(error) => break Err(error).context("Failed to read from the host channel"),
                };

                match host::handle_frame(&mut messenger, &frame).await {
                    Ok(Some(reply)) => {
                        if let Err(error) = write_line(&mut stdout, &reply).await {
                            break Err(error);
                        }
                    }
                    Ok(None) => {}
                    Err(error) => warn!(
                        "Skipping malformed host message {:?}: {error:?}",
                        String::from_utf8_lossy(&frame)
                    ),
                }
            },
            Some(call) = outbound_rx.recv() => {
                let written = match host::encode_outbound(&call) {
                    Ok(encoded) => write_line(&mut stdout, &encoded).await,
                    Err(error) => Err(error),
                };
                if let Err(error) = written {
                    break Err(error);
                }
            },
            () = &mut ctrl_c => {
                info!("Interruption signal received");
                break Ok(());
            },
            () = &mut terminate => {
                info!("Terminate signal received");
                break Ok(());
            },
        }
    };

    messenger.shutdown().await;
    result
}
