use clap::Parser;

use crate::logging::LEVEL_WARNING;

/// Remote console for game servers speaking the Source RCON protocol.
#[derive(Parser, Debug, Clone)]
#[command(name = "tcprcon", version, about)]
pub struct Cli {
    /// RCON address, excluding port
    #[arg(long, default_value = "localhost")]
    pub address: String,

    /// RCON port
    #[arg(long, default_value_t = 7778)]
    pub port: u16,

    /// RCON password. If not provided it is taken from the rcon_password
    /// environment variable (after confirmation) or prompted for.
    #[arg(long = "pw")]
    pub password: Option<String>,

    /// Log level as a syslog severity (0-7, 8 for trace)
    #[arg(long = "log", default_value_t = LEVEL_WARNING)]
    pub log_level: u8,

    /// Run a single command, print the response and exit
    #[arg(long = "cmd")]
    pub command: Option<String>,
}

impl Cli {
    pub fn full_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
