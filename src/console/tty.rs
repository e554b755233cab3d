use std::io;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{trace, warn};

/// Raw mode plus the alternate screen for as long as the guard lives.
///
/// Call [RawTerminal::restore] to get restore errors back; dropping the guard
/// without it still puts the terminal back, ignoring errors.
pub struct RawTerminal {
    alternate: bool,
    restored: bool,
}

impl RawTerminal {
    pub fn acquire() -> io::Result<Self> {
        // crossterm keeps the original attributes around for disable_raw_mode
        enable_raw_mode()?;
        let mut guard = RawTerminal {
            alternate: false,
            restored: false,
        };

        keep_signals_and_newlines()?;
        execute!(io::stdout(), EnterAlternateScreen)?;
        guard.alternate = true;

        trace!("terminal switched to raw mode");
        Ok(guard)
    }

    pub fn leave_alternate_screen(&mut self) -> io::Result<()> {
        if self.alternate {
            self.alternate = false;
            execute!(io::stdout(), LeaveAlternateScreen)?;
        }
        Ok(())
    }

    pub fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        self.leave_alternate_screen()?;
        disable_raw_mode()?;
        trace!("terminal attributes restored");
        Ok(())
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(err) = self.leave_alternate_screen() {
            warn!("failed to leave alternate screen: {}", err);
        }
        if let Err(err) = disable_raw_mode() {
            warn!("failed to restore terminal: {}", err);
        }
    }
}

// Raw mode turns off signal generation and output post-processing. Put both
// back so ctrl-c still interrupts and "\n" still returns the carriage.
#[cfg(unix)]
fn keep_signals_and_newlines() -> io::Result<()> {
    let fd = libc::STDIN_FILENO;
    let mut termios = std::mem::MaybeUninit::<libc::termios>::uninit();

    // SAFETY: tcgetattr fully initializes the struct when it returns 0.
    let mut termios = unsafe {
        if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        termios.assume_init()
    };
    termios.c_lflag |= libc::ISIG;
    termios.c_oflag |= libc::OPOST | libc::ONLCR;

    // SAFETY: termios is a valid, initialized struct.
    if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &termios) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn keep_signals_and_newlines() -> io::Result<()> {
    Ok(())
}

/// The signals that end an interactive session.
#[cfg(unix)]
pub struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    abort: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn listen() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Signals {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
            abort: signal(SignalKind::from_raw(libc::SIGABRT))?,
        })
    }

    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => trace!("got SIGINT"),
            _ = self.terminate.recv() => trace!("got SIGTERM"),
            _ = self.hangup.recv() => trace!("got SIGHUP"),
            _ = self.abort.recv() => trace!("got SIGABRT"),
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn listen() -> io::Result<Self> {
        Ok(Signals)
    }

    pub async fn recv(&mut self) {
        let _ = tokio::signal::ctrl_c().await;
    }
}
