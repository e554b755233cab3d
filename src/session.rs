//! Wires transport, response stream and console into a session.

use crossterm::style::Stylize;
use log::{debug, error, trace};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;

use crate::{
    console::{Console, ConsoleWriter},
    error::RconError,
    logging,
    packet::{self, Packet},
    stream::{self, StreamedPacket},
    transport::{Transport, Writer},
};

/// Sends one command and waits for the response carrying its id.
pub async fn run_once<S>(transport: &mut Transport<S>, command: &str) -> Result<Packet, RconError>
where
    S: AsyncRead + AsyncWrite,
{
    let id = transport.current_id();
    let exec = Packet::exec(id, command);
    trace!("sending command {} as packet {}", command, id);
    transport.write(&exec.encode()).await?;
    packet::decode_with_id(transport, id).await
}

/// Runs the interactive console on an authenticated transport until the
/// user leaves or the server hangs up. Every task has stopped and the
/// connection is closed by the time this returns.
pub async fn run_interactive<S>(transport: Transport<S>) -> Result<(), RconError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (console, submissions) = Console::new(format!("rcon@{}", transport.address()));
    let writer = console.writer();
    logging::redirect(console.writer());

    let token = CancellationToken::new();
    let (reader, sender) = transport.into_split();
    let packets = stream::start(reader, token.clone());

    let (closed_tx, closed_rx) = oneshot::channel();
    let display = tokio::spawn(display_packets(packets, writer.clone(), closed_tx));
    let submit = tokio::spawn(send_submissions(submissions, sender, writer, token.clone()));
    let mut app = tokio::spawn(console.run(token.clone()));

    let mut console_result = None;
    let connection_result = tokio::select! {
        result = &mut app => {
            debug!("console exited");
            console_result = Some(joined("console", result));
            Ok(())
        }
        Ok(err) = closed_rx => Err(err),
    };
    token.cancel();

    let console_result = match console_result {
        Some(result) => result,
        None => joined("console", app.await),
    };
    // display only finishes once the response stream has dropped its end
    if let Err(err) = display.await {
        error!("packet display task failed: {}", err);
    }
    let close_result = match submit.await {
        Ok(sender) => sender.close().await,
        Err(err) => {
            error!("submission task failed: {}", err);
            Ok(())
        }
    };
    logging::reset();

    connection_result.and(console_result).and(close_result)
}

fn joined(
    task: &str,
    result: Result<Result<(), RconError>, tokio::task::JoinError>,
) -> Result<(), RconError> {
    result.unwrap_or_else(|err| {
        error!("{} task failed: {}", task, err);
        Ok(())
    })
}

// Shows every streamed packet as it arrives, until the response stream
// closes its channel. A closed connection is reported through `closed`.
// Waiting on a full console holds the response stream back in turn.
async fn display_packets(
    mut packets: mpsc::Receiver<StreamedPacket>,
    console: ConsoleWriter,
    closed: oneshot::Sender<RconError>,
) {
    let mut closed = Some(closed);
    while let Some(streamed) = packets.recv().await {
        match streamed {
            Ok(packet) => {
                console.show(format_packet(&packet)).await;
            }
            Err(err) if err.is_deadline_exceeded() => {
                debug!("read deadline reached; connection is idle or server is silent");
            }
            Err(err) if err.is_connection_closed() => {
                if let Some(closed) = closed.take() {
                    let _ = closed.send(err);
                }
            }
            Err(err) => error!("error while reading from rcon server: {}", err),
        }
    }
    trace!("packet display stopped");
}

fn format_packet(packet: &Packet) -> String {
    format!(
        "({}): RCV PKT {}\n{}\n",
        packet.id().to_string().green().bold(),
        packet.packet_type().to_string().green().bold(),
        packet.body_str().trim_end_matches(['\n', '\r']).green(),
    )
}

// Single writer: turns each submitted command into an exec packet. Hands the
// write half back so the caller can close it.
async fn send_submissions<S>(
    mut submissions: mpsc::UnboundedReceiver<String>,
    mut sender: Writer<S>,
    console: ConsoleWriter,
    token: CancellationToken,
) -> Writer<S>
where
    S: AsyncWrite,
{
    loop {
        let command = tokio::select! {
            _ = token.cancelled() => break,
            command = submissions.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let id = sender.current_id();
        console
            .show(format!(
                "({}): SND CMD {}\n",
                id.to_string().green().bold(),
                command.as_str().blue(),
            ))
            .await;
        if let Err(err) = sender.write(&Packet::exec(id, &command).encode()).await {
            error!("failed to send command: {}", err);
        }
    }
    sender
}
