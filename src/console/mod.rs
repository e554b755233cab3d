//! Full-screen interactive console: a scrolling log pane with one input line.
//!
//! Keystrokes, display text and shutdown all funnel into one event loop,
//! which is the only place the screen state changes. Everything else talks to
//! it over channels: [ConsoleWriter] to print, the receiver returned by
//! [Console::new] to pick up typed commands.

pub mod input;
pub mod screen;
pub mod tty;

use std::{
    future::Future,
    io::{self, IsTerminal, Read, Write},
    thread,
};

use crossterm::terminal;
use log::{debug, trace};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::RconError;
use screen::Screen;
use tty::{RawTerminal, Signals};

/// Display messages the console holds before writers have to wait.
pub const DISPLAY_CAPACITY: usize = 10;

/// Cloneable handle that appends text to the console's scrollback. Also an
/// [io::Write] so it can stand in as a log sink.
#[derive(Clone)]
pub struct ConsoleWriter {
    tx: mpsc::Sender<String>,
}

impl ConsoleWriter {
    /// Waits for room in the display queue. Returns `false` once the console
    /// is gone.
    pub async fn show(&self, text: impl Into<String>) -> bool {
        self.tx.send(text.into()).await.is_ok()
    }

    /// Queues text without waiting. Returns `false` when the queue is full or
    /// the console is gone, leaving the caller to put the text elsewhere.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.tx.try_send(text.into()).is_ok()
    }
}

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.tx.try_send(String::from_utf8_lossy(buf).into_owned()) {
            Ok(()) => Ok(buf.len()),
            Err(TrySendError::Full(_)) => Err(io::ErrorKind::WouldBlock.into()),
            Err(TrySendError::Closed(_)) => Err(io::ErrorKind::BrokenPipe.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Console {
    screen: Screen,
    display_tx: mpsc::Sender<String>,
    display_rx: mpsc::Receiver<String>,
    submit_tx: mpsc::UnboundedSender<String>,
}

impl Console {
    /// Builds a console and the receiver for commands typed into it, in
    /// submission order.
    pub fn new(prompt: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (display_tx, display_rx) = mpsc::channel(DISPLAY_CAPACITY);
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let console = Console {
            screen: Screen::new(prompt),
            display_tx,
            display_rx,
            submit_tx,
        };
        (console, submit_rx)
    }

    pub fn writer(&self) -> ConsoleWriter {
        ConsoleWriter {
            tx: self.display_tx.clone(),
        }
    }

    /// Takes over the terminal until `token` is cancelled, a termination
    /// signal arrives or stdin closes. The terminal is restored on every
    /// path out.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), RconError> {
        if !io::stdin().is_terminal() {
            return Err(RconError::NotATerminal);
        }
        let mut signals = Signals::listen().map_err(RconError::Terminal)?;
        let raw = RawTerminal::acquire().map_err(RconError::Terminal)?;
        let mut keys = listen_stdin(io::stdin(), token.clone()).map_err(RconError::Terminal)?;

        let shutdown = async {
            tokio::select! {
                _ = token.cancelled() => debug!("console cancelled"),
                _ = signals.recv() => debug!("console interrupted by signal"),
            }
        };
        let result = pump(
            &mut self.screen,
            &mut keys,
            &mut self.display_rx,
            &self.submit_tx,
            shutdown,
            redraw,
        )
        .await;

        let closed = close(&self.screen, raw);
        result.and(closed)
    }
}

/// The event loop. Redraws once up front and after every event; returns when
/// `shutdown` resolves or the key channel closes.
async fn pump<F, D>(
    screen: &mut Screen,
    keys: &mut mpsc::Receiver<u8>,
    display: &mut mpsc::Receiver<String>,
    submissions: &mpsc::UnboundedSender<String>,
    shutdown: F,
    mut draw: D,
) -> Result<(), RconError>
where
    F: Future<Output = ()>,
    D: FnMut(&Screen) -> Result<(), RconError>,
{
    tokio::pin!(shutdown);
    draw(screen)?;

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            key = keys.recv() => match key {
                Some(byte) => {
                    if let Some(command) = screen.handle_byte(byte) {
                        trace!("submitting {:?}", command);
                        if submissions.send(command).is_err() {
                            debug!("nobody is listening for submissions");
                        }
                    }
                }
                None => {
                    debug!("stdin closed");
                    return Ok(());
                }
            },
            Some(text) = display.recv() => screen.push_text(&text),
        }
        draw(screen)?;
    }
}

fn redraw(screen: &Screen) -> Result<(), RconError> {
    let size = terminal::size().map_err(RconError::Terminal)?;
    screen
        .render(&mut io::stdout().lock(), size)
        .map_err(RconError::Terminal)
}

// Leaves the alternate screen, reprints what was visible so it survives in
// the normal buffer, then hands the terminal back.
fn close(screen: &Screen, mut raw: RawTerminal) -> Result<(), RconError> {
    raw.leave_alternate_screen().map_err(RconError::Terminal)?;
    let size = terminal::size().map_err(RconError::Terminal)?;
    let mut stdout = io::stdout().lock();
    screen
        .render_final(&mut stdout, size)
        .map_err(RconError::Terminal)?;
    raw.restore().map_err(RconError::Terminal)?;
    writeln!(stdout).map_err(RconError::Terminal)
}

// Blocking byte-at-a-time reader on its own thread. It notices cancellation
// after the read it is blocked in returns; that byte is dropped.
fn listen_stdin<R>(mut input: R, token: CancellationToken) -> io::Result<mpsc::Receiver<u8>>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    thread::Builder::new()
        .name("stdin-listener".into())
        .spawn(move || {
            let mut byte = [0u8; 1];
            while !token.is_cancelled() {
                match input.read(&mut byte) {
                    Ok(0) => break,
                    Ok(_) if token.is_cancelled() => break,
                    Ok(_) => {
                        if tx.blocking_send(byte[0]).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!("stdin read failed: {}", err);
                        break;
                    }
                }
            }
            trace!("stdin listener stopped");
        })?;
    Ok(rx)
}
