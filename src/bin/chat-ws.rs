//! Terminal chat client: prints the room, sends every stdin line.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chat_ws::{
    ChatClient, ChatConfig, ChatError, ChatMessage, ChatResult, Credential, MessageBuffer,
};

#[derive(Debug, Parser)]
#[command(name = "chat-ws", about = "Chat-room websocket client")]
struct Cli {
    /// Login token (the `fish-dog-token` value from the web client)
    #[arg(long, env = "CHAT_WS_TOKEN", hide_env_values = true)]
    token: String,

    /// JSON configuration file; missing fields take defaults
    #[arg(long)]
    config: Option<String>,

    /// Override the websocket URL
    #[arg(long)]
    ws_url: Option<String>,

    /// Number of history messages to load before connecting (0 skips history)
    #[arg(long, default_value_t = 50)]
    history: u32,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> ChatResult<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log);

    let config = load_configuration(&cli).await?;
    let credential = Credential::new(cli.token.clone());
    if credential.is_empty() {
        error!("no token supplied; pass --token or set CHAT_WS_TOKEN");
        std::process::exit(2);
    }

    let buffer = Arc::new(Mutex::new(MessageBuffer::new(config.message_buffer_capacity)));
    let client = ChatClient::new(config, credential)?;
    register_handlers(&client, &buffer);

    if cli.history > 0 {
        match client.history(Some(cli.history)).await {
            Ok(records) => {
                for message in &records {
                    print_message(message);
                }
                info!(count = records.len(), "history loaded");
                buffer.lock().replace_with_history(records);
            }
            Err(err) => warn!(error = %err, "history unavailable"),
        }
    }

    if let Err(err) = client.connect().await {
        report(&err);
        std::process::exit(1);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        break;
                    }
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "/quit" {
                    break;
                }
                match client.send_message(text).await {
                    Ok(_) => {
                        let profile = client.profile().await.ok().flatten();
                        let echo = buffer.lock().push_local_echo(text, profile.as_ref(), Utc::now());
                        print_message(&echo);
                    }
                    Err(err) => report(&err),
                }
            }
        }
    }

    client.shutdown().await?;
    info!("chat-ws exited");
    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn load_configuration(cli: &Cli) -> ChatResult<ChatConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!(path = %path, "loading configuration");
            let json = tokio::fs::read_to_string(path)
                .await
                .map_err(|err| ChatError::Config(format!("{path}: {err}")))?;
            ChatConfig::from_json_str(&json)?
        }
        None => ChatConfig::default(),
    };
    if let Some(ws_url) = &cli.ws_url {
        config.ws_url = ws_url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn register_handlers(client: &ChatClient, buffer: &Arc<Mutex<MessageBuffer>>) {
    let buffer = Arc::clone(buffer);
    client.on_message(move |inbound| {
        let Some(message) = inbound.chat_message() else {
            info!(kind = ?inbound.kind(), "non-chat event");
            return;
        };
        if buffer.lock().push_inbound(message.clone()) == chat_ws::core::InboundDisposition::Appended {
            print_message(&message);
        }
    });
    client.on_connected(|| info!("connected to chat room"));
    client.on_error(report);
    client.on_disconnected(|reason| warn!(%reason, "disconnected"));
}

fn report(err: &ChatError) {
    match err.user_guidance() {
        Some(guidance) => error!(error = %err, guidance, "chat error"),
        None => error!(error = %err, "chat error"),
    }
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] {} (Lv.{}): {}",
        message.timestamp, message.sender.name, message.sender.level, message.content
    );
}
