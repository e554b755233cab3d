//! Leveled logger behind the `log` facade.
//!
//! Verbosity uses syslog severity numbers (0 emergency .. 7 debug, anything
//! above that turns on trace). Lines go to stderr until [redirect] points
//! them at the interactive console, and back again after [reset].

use std::{
    io::{self, Write},
    sync::Mutex,
};

use crossterm::style::{StyledContent, Stylize};
use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::console::ConsoleWriter;

pub const LEVEL_CRITICAL: u8 = 2;
pub const LEVEL_ERROR: u8 = 3;
pub const LEVEL_WARNING: u8 = 4;
pub const LEVEL_INFO: u8 = 6;
pub const LEVEL_DEBUG: u8 = 7;

enum Sink {
    Stderr,
    Console(ConsoleWriter),
}

struct RconLogger {
    sink: Mutex<Sink>,
}

static LOGGER: RconLogger = RconLogger {
    sink: Mutex::new(Sink::Stderr),
};

impl Log for RconLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("{} {}\n", prefix(record.level()), record.args());
        let Ok(mut sink) = self.sink.lock() else {
            return;
        };
        match &mut *sink {
            Sink::Stderr => {
                let _ = io::stderr().write_all(line.as_bytes());
            }
            Sink::Console(writer) => {
                // queue full, or the console is already gone during shutdown
                if !writer.send(line.clone()) {
                    let _ = io::stderr().write_all(line.as_bytes());
                }
            }
        }
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

fn prefix(level: Level) -> StyledContent<&'static str> {
    match level {
        Level::Error => "RCON:ERR::".red(),
        Level::Warn => "RCON:WRN::".magenta(),
        Level::Info => "RCON:INF::".stylize(),
        Level::Debug => "RCON:DBG::".yellow(),
        Level::Trace => "RCON:TRC::".dark_grey(),
    }
}

/// Maps a syslog severity to the most verbose `log` level it allows.
pub fn level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0..=1 => LevelFilter::Off,
        LEVEL_CRITICAL..=LEVEL_ERROR => LevelFilter::Error,
        LEVEL_WARNING..=5 => LevelFilter::Warn,
        LEVEL_INFO => LevelFilter::Info,
        LEVEL_DEBUG => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the logger. Calling it again only changes the level.
pub fn init(verbosity: u8) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level_filter(verbosity));
}

/// Sends log lines into the console scrollback.
pub fn redirect(writer: ConsoleWriter) {
    if let Ok(mut sink) = LOGGER.sink.lock() {
        *sink = Sink::Console(writer);
    }
}

/// Sends log lines back to stderr.
pub fn reset() {
    if let Ok(mut sink) = LOGGER.sink.lock() {
        *sink = Sink::Stderr;
    }
}
