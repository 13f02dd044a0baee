use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::app::App;
use crate::audio::DeviceManager;
use crate::controller::FrameScheduler;
use crate::renderer::Surface;
use crate::visualizer::VisualStyle;

/// Target of a `style` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleChoice {
    Set(VisualStyle),
    Next,
}

/// Commands sent from IPC server to render loop
#[derive(Debug)]
pub enum IpcCommand {
    Start { device: Option<String>, reply: oneshot::Sender<String> },
    Stop { reply: oneshot::Sender<String> },
    Style { choice: StyleChoice, reply: oneshot::Sender<String> },
    ColorNext { reply: oneshot::Sender<String> },
    Status { reply: oneshot::Sender<String> },
    Devices { reply: oneshot::Sender<String> },
    Save { reply: oneshot::Sender<String> },
    Ping { reply: oneshot::Sender<String> },
}

/// Get the socket path for IPC
pub fn socket_path() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(dir).join("scopeviz.sock")
    } else {
        PathBuf::from("/tmp/scopeviz.sock")
    }
}

/// Parse a protocol line into an IpcCommand
fn parse_command(line: &str, reply: oneshot::Sender<String>) -> Result<IpcCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["start"] => Ok(IpcCommand::Start { device: None, reply }),
        ["start", device] => Ok(IpcCommand::Start {
            device: Some(device.to_string()),
            reply,
        }),
        ["stop"] => Ok(IpcCommand::Stop { reply }),
        ["style", "next"] => Ok(IpcCommand::Style {
            choice: StyleChoice::Next,
            reply,
        }),
        ["style", name] => {
            let style = name.parse::<VisualStyle>().map_err(anyhow::Error::msg)?;
            Ok(IpcCommand::Style {
                choice: StyleChoice::Set(style),
                reply,
            })
        }
        ["color", "next"] => Ok(IpcCommand::ColorNext { reply }),
        ["status"] => Ok(IpcCommand::Status { reply }),
        ["devices"] => Ok(IpcCommand::Devices { reply }),
        ["save"] => Ok(IpcCommand::Save { reply }),
        ["ping"] => Ok(IpcCommand::Ping { reply }),
        _ => Err(anyhow::anyhow!("Unknown command: {}", line)),
    }
}

/// Apply an IPC command to the running app and answer it
pub fn process_ipc_command<D, S, F>(cmd: IpcCommand, app: &mut App<D, S, F>)
where
    D: DeviceManager,
    S: Surface,
    F: FrameScheduler,
{
    match cmd {
        IpcCommand::Start { device, reply } => {
            let response = match app.start(device.as_deref()) {
                Ok(id) => format!("ok: started on {}", id),
                Err(e) => format!("err: {}", e),
            };
            let _ = reply.send(response);
        }
        IpcCommand::Stop { reply } => {
            app.stop();
            let _ = reply.send("ok: stopped".to_string());
        }
        IpcCommand::Style { choice, reply } => {
            let style = match choice {
                StyleChoice::Set(style) => {
                    app.set_style(style);
                    style
                }
                StyleChoice::Next => app.next_style(),
            };
            let _ = reply.send(format!("ok: {}", style.key()));
        }
        IpcCommand::ColorNext { reply } => {
            let _ = reply.send(format!("ok: {}", app.next_color().name()));
        }
        IpcCommand::Status { reply } => {
            let _ = reply.send(format!("ok: {}", app.status()));
        }
        IpcCommand::Devices { reply } => {
            let response = match app.devices() {
                Ok(devices) => {
                    let ids: Vec<String> = devices.into_iter().map(|d| d.id).collect();
                    format!("ok: {}", ids.join(","))
                }
                Err(e) => format!("err: {}", e),
            };
            let _ = reply.send(response);
        }
        IpcCommand::Save { reply } => {
            let response = match app.save() {
                Ok(path) => format!("ok: saved to {}", path.display()),
                Err(e) => format!("err: {:#}", e),
            };
            let _ = reply.send(response);
        }
        IpcCommand::Ping { reply } => {
            let _ = reply.send("ok: pong".to_string());
        }
    }
}

/// Handle a single client connection
async fn handle_client<R, W>(reader: R, mut writer: W, cmd_tx: mpsc::Sender<IpcCommand>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf_reader = BufReader::new(reader);
    let mut line = String::new();
    buf_reader.read_line(&mut line).await?;
    let line = line.trim();

    if line.is_empty() {
        return Ok(());
    }

    let (reply_tx, reply_rx) = oneshot::channel();

    let command = match parse_command(line, reply_tx) {
        Ok(cmd) => cmd,
        Err(e) => {
            writer
                .write_all(format!("err: {}\n", e).as_bytes())
                .await?;
            return Ok(());
        }
    };

    cmd_tx
        .send(command)
        .await
        .map_err(|_| anyhow::anyhow!("Render loop has shut down"))?;

    let response = reply_rx
        .await
        .unwrap_or_else(|_| "err: internal error".to_string());

    writer
        .write_all(format!("{}\n", response).as_bytes())
        .await?;
    Ok(())
}

/// Start the IPC server, listening for commands on a Unix socket
pub async fn start_server(cmd_tx: mpsc::Sender<IpcCommand>) -> Result<()> {
    let path = socket_path();

    // Remove stale socket from previous run
    let _ = std::fs::remove_file(&path);

    let listener = UnixListener::bind(&path).context("Failed to bind IPC socket")?;

    info!("IPC server listening on {}", path.display());

    loop {
        let (stream, _) = listener.accept().await?;
        let cmd_tx = cmd_tx.clone();

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            if let Err(e) = handle_client(reader, writer, cmd_tx).await {
                debug!("IPC client error: {}", e);
            }
        });
    }
}

/// Send a command to a running scopeviz instance (client mode)
pub async fn send_command(line: &str) -> Result<String> {
    let path = socket_path();

    let stream = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        UnixStream::connect(&path),
    )
    .await
    .context("Connection timed out")?
    .context("Could not connect to scopeviz. Is it running?")?;

    let (reader, mut writer) = stream.into_split();

    writer.write_all(format!("{}\n", line).as_bytes()).await?;
    writer.shutdown().await?;

    let mut buf_reader = BufReader::new(reader);
    let mut response = String::new();

    tokio::time::timeout(
        std::time::Duration::from_secs(2),
        buf_reader.read_line(&mut response),
    )
    .await
    .context("Response timed out")?
    .context("Failed to read response")?;

    Ok(response.trim().to_string())
}
