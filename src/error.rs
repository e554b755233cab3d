use thiserror::Error;

use crate::packet::Packet;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if the frame is mangled in some way (bad size field, truncated
    /// header).
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    /// Returned by correlated reads when the server answered with a different
    /// id. The packet is kept so the caller can still log or use it.
    #[error("packet id mismatch: expected {expected}, got {}", .packet.id())]
    IdMismatch { expected: i32, packet: Packet },
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// Internal error used if the stream was successfully established, but
    /// there was a problem writing to the socket.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// Internal error used if the stream was successfully established, but
    /// there was a problem reading from the socket.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    #[error("cannot close connection to host")]
    CloseError(#[source] std::io::Error),
    /// The peer closed the connection.
    #[error("connection closed by host")]
    ConnectionClosed,
    /// Returned if a read or write deadline passed before the operation
    /// finished. Expected while streaming from an idle server.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Returned if you can't remember the password.
    #[error("bad password")]
    AuthenticationError,
    #[error("unexpected packet type {got}, expected {want}")]
    UnexpectedPacketType { got: i32, want: i32 },
    /// The interactive console needs stdin to be a tty.
    #[error("expected to run in a terminal")]
    NotATerminal,
    /// Terminal setup, geometry or restore failure.
    #[error("terminal error")]
    Terminal(#[source] std::io::Error),
}

impl RconError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RconError::DeadlineExceeded)
    }

    pub fn is_connection_closed(&self) -> bool {
        matches!(self, RconError::ConnectionClosed)
    }

    /// Classifies a read-side io error. Timeouts and EOF get their own
    /// variants since the streaming reader treats them very differently.
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => RconError::DeadlineExceeded,
            std::io::ErrorKind::UnexpectedEof => RconError::ConnectionClosed,
            _ => RconError::ReceiveError(err),
        }
    }
}

// Needed by the codec; io errors only ever come from the read side there.
impl From<std::io::Error> for RconError {
    fn from(err: std::io::Error) -> Self {
        RconError::from_read(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn read_errors_are_classified() {
        let timeout = RconError::from_read(io::Error::new(io::ErrorKind::TimedOut, "late"));
        assert!(timeout.is_deadline_exceeded());

        let eof = RconError::from_read(io::ErrorKind::UnexpectedEof.into());
        assert!(eof.is_connection_closed());

        let reset = RconError::from_read(io::ErrorKind::ConnectionReset.into());
        assert!(matches!(reset, RconError::ReceiveError(_)));
    }
}
