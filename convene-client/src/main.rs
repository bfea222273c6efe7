//! Replays a recorded session against one connection, offline.
//!
//! The script is JSON lines, one step per line:
//!
//! ```text
//! {"input": "/join #rust"}
//! {"input": "hello", "dialog": "#rust"}
//! {"frame": {"event": "sent", "id": 1, "dialog_id": "#rust"}}
//! {"advance_ms": 6000}
//! ```
//!
//! Outbound requests are printed as they are produced, the resulting dialogs at the end.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use convene_client::api::ConnectionInfo;
use convene_client::config::{self, ClientConfig};
use convene_client::user::ChannelTransport;
use convene_client::{Client, Frame, User};

#[derive(Parser, Debug)]
#[command(name = "convene-replay", about = "Replay a chat session script against one connection")]
struct Args {
    /// Script to replay (JSON lines). Reads stdin when omitted.
    script: Option<PathBuf>,

    /// Connection id the script talks to.
    #[arg(long, default_value = "irc-local")]
    connection: String,

    /// Config file (defaults to ~/.config/convene/client.toml).
    #[arg(long, env = "CONVENE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Step {
    Input {
        input: String,
        #[serde(default)]
        dialog: Option<String>,
    },
    Frame {
        frame: Frame,
    },
    Advance {
        advance_ms: u64,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the replay output.
    let json_logs = std::env::var("CONVENE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("convene_client=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(config::default_path);
    let config = ClientConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let reader: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let (transport, mut outbound) = ChannelTransport::pair();
    let mut client = Client::new(User::new(transport), &config);
    client.ensure_connection(ConnectionInfo {
        connection_id: args.connection.clone(),
        ..Default::default()
    });

    let mut now = Instant::now();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.trim_start().starts_with("//") {
            continue;
        }
        let step: Step = serde_json::from_str(&line)
            .with_context(|| format!("line {}: bad step", lineno + 1))?;
        match step {
            Step::Input { input, dialog } => {
                client.send_at(&args.connection, &input, dialog.as_deref(), now)?;
            }
            Step::Frame { mut frame } => {
                let msg = frame.message_mut();
                if msg.connection_id.is_empty() {
                    msg.connection_id = args.connection.clone();
                }
                client.handle_frame(frame);
            }
            Step::Advance { advance_ms } => {
                now += Duration::from_millis(advance_ms);
                client.expire(now);
            }
        }
        while let Ok(msg) = outbound.try_recv() {
            println!("> {}", serde_json::to_string(&msg)?);
        }
    }

    println!("{}", serde_json::to_string_pretty(client.user().dialogs())?);
    Ok(())
}
