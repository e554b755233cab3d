use std::error::Error;

use clap::Parser;
use log::{debug, error, info};
use tcprcon::{auth, cli::Cli, logging, password, session, transport::Transport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    let address = cli.full_address();
    let password = password::resolve(cli.password.as_deref())?;

    debug!("dialing {}", address);
    let mut transport = Transport::connect(&address).await?;

    debug!("authenticating");
    if let Err(err) = auth::authenticate(&mut transport, &password).await {
        error!("auth failure: {}", err);
        return Err(err.into());
    }
    info!("authenticated with {}", address);

    match cli.command {
        Some(command) => {
            let response = session::run_once(&mut transport, &command).await;
            transport.close().await?;
            println!("{}", response?.body_str().trim_end());
        }
        None => session::run_interactive(transport).await?,
    }

    debug!("bye");
    Ok(())
}
