use clap::Parser;
use relaychat::prelude::*;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::select;
use tracing::warn;

/// Terminal client for a relaychat relay.
///
/// Type a line to broadcast it, `@name text` to message one user,
/// `/name NEW` to retry registration after a refusal, `/quit` to leave.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Name to register under (blank lets the relay choose).
    #[arg(default_value = "")]
    username: String,

    /// Relay host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Relay port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    init_tracing();

    let cli = Cli::parse();
    let (client, mut events) =
        ChatClient::connect(&cli.host, cli.port, &cli.username).await?;

    let mut stdin = BufReader::new(io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        select! {
            event = events.recv() => match event {
                Some(event) => {
                    if !render_event(event).await? {
                        break;
                    }
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => {
                    if let Err(e) = handle_input(&client, line.trim_end()).await {
                        write_stdout(&format!("*** {e}")).await?;
                    }
                }
                None => {
                    stdin_open = false;
                    if let Err(e) = client.disconnect().await {
                        warn!(error = %e, "disconnect refused, dropping connection");
                        client.close();
                        return Ok(());
                    }
                }
            },
        }
    }

    client.closed().await;
    Ok(())
}

async fn handle_input(client: &ChatClient, line: &str) -> Result<(), RelayError> {
    if line.is_empty() {
        return Ok(());
    }
    if line.eq_ignore_ascii_case("/quit") {
        return client.disconnect().await;
    }
    if let Some(name) = line.strip_prefix("/name ") {
        return client.reconnect(name.trim()).await;
    }
    match line.strip_prefix('@').and_then(|rest| rest.split_once(' ')) {
        Some((receiver, text)) => client.send_message(receiver, text).await,
        None => client.send_message(USER_ALL, line).await,
    }
}

/// Prints one event; returns `false` once the session is over.
async fn render_event(event: ClientEvent) -> io::Result<bool> {
    match event {
        ClientEvent::StateChanged(ConnectionState::Disconnected) => {
            write_stdout("*** disconnected").await?;
            Ok(false)
        }
        ClientEvent::StateChanged(ConnectionState::Connected) => {
            write_stdout("*** connected").await?;
            Ok(true)
        }
        ClientEvent::StateChanged(state) => {
            if state == ConnectionState::New {
                write_stdout("*** not registered, try /name <other>").await?;
            }
            Ok(true)
        }
        ClientEvent::MessageReceived(message) => {
            let line = match message.kind {
                MessageKind::Message if message.is_broadcast() => {
                    format!("[{}] {}", message.sender, message.payload())
                }
                MessageKind::Message => format!(
                    "[{} -> {}] {}",
                    message.sender,
                    message.receiver,
                    message.payload()
                ),
                MessageKind::Error => format!("!!! {}", message.payload()),
                _ => format!("*** {}", message.payload()),
            };
            write_stdout(&line).await?;
            Ok(true)
        }
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
