use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::RconError,
    packet::{self, Packet, SERVERDATA_AUTH_RESPONSE, SERVERDATA_RESPONSE_VALUE},
    transport::Transport,
};

/// Sends the password and waits for the server's verdict.
///
/// Some servers send an empty `SERVERDATA_RESPONSE_VALUE` right before the
/// real `SERVERDATA_AUTH_RESPONSE`, so one extra read is allowed for that.
pub async fn authenticate<S>(transport: &mut Transport<S>, password: &str) -> Result<(), RconError>
where
    S: AsyncRead + AsyncWrite,
{
    let auth_id = transport.current_id();
    let auth_packet = Packet::auth(auth_id, password);

    trace!("sending auth packet {} to server", auth_id);
    let written = transport.write(&auth_packet.encode()).await?;
    debug!("written {} bytes of auth packet to connection", written);

    let mut response = read_auth_response(transport, auth_id).await?;
    if response.packet_type() == SERVERDATA_RESPONSE_VALUE {
        debug!("got the empty response value some servers send before auth, reading again");
        response = read_auth_response(transport, auth_id).await?;
    }

    if response.packet_type() != SERVERDATA_AUTH_RESPONSE {
        return Err(RconError::UnexpectedPacketType {
            got: response.packet_type(),
            want: SERVERDATA_AUTH_RESPONSE,
        });
    }

    trace!("auth complete");
    Ok(())
}

async fn read_auth_response<S>(transport: &mut Transport<S>, auth_id: i32) -> Result<Packet, RconError>
where
    S: AsyncRead + AsyncWrite,
{
    match packet::decode_with_id(transport, auth_id).await {
        // the server answers a bad password with an id of -1
        Err(RconError::IdMismatch { packet, .. }) if packet.id() == -1 => {
            Err(RconError::AuthenticationError)
        }
        other => other,
    }
}
