use std::time::Duration;

use bytes::BytesMut;
use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::mpsc,
    time::timeout,
};
use tokio_util::{codec::Decoder, sync::CancellationToken};

use crate::{
    error::RconError,
    packet::{Packet, RconCodec},
    transport::Reader,
};

/// How long a single read may block before it comes back as
/// [RconError::DeadlineExceeded].
pub const READ_DEADLINE: Duration = Duration::from_secs(10);

/// Outcome of one decode attempt. Deadline errors are normal on an idle
/// connection; [RconError::ConnectionClosed] is always the last item.
pub type StreamedPacket = Result<Packet, RconError>;

/// Spawns the background reader and returns the channel it feeds.
///
/// The loop decodes packets until `token` is cancelled or the server closes
/// the connection, emitting every outcome, errors included. Packets are not
/// correlated to requests here; the consumer decides what to do with ids.
/// The channel holds a single item, so a slow consumer pauses the reads.
///
/// Bytes are buffered across reads, so a deadline that fires in the middle of
/// a frame only delays that frame.
pub fn start<S>(mut reader: Reader<S>, token: CancellationToken) -> mpsc::Receiver<StreamedPacket>
where
    S: AsyncRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut codec = RconCodec::new();
        let mut buffer = BytesMut::with_capacity(4096);

        loop {
            if token.is_cancelled() {
                break;
            }

            let result = match codec.decode(&mut buffer) {
                Ok(Some(packet)) => Ok(packet),
                Err(err) => Err(err),
                Ok(None) => {
                    let read = tokio::select! {
                        _ = token.cancelled() => break,
                        read = timeout(READ_DEADLINE, reader.read_buf(&mut buffer)) => read,
                    };
                    match read {
                        Ok(Ok(0)) => {
                            if !codec.is_idle(&buffer) {
                                debug!("connection closed inside a frame");
                            }
                            Err(RconError::ConnectionClosed)
                        }
                        Ok(Ok(_)) => continue,
                        Ok(Err(err)) => Err(RconError::from_read(err)),
                        Err(_) => Err(RconError::DeadlineExceeded),
                    }
                }
            };

            let closed = matches!(result, Err(RconError::ConnectionClosed));
            match &result {
                Ok(packet) => trace!("streamed packet {}", packet.id()),
                Err(err) if err.is_deadline_exceeded() => {
                    debug!("read deadline reached; connection is idle or server is silent")
                }
                Err(err) => debug!("stream read failed: {}", err),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                sent = tx.send(result) => {
                    if sent.is_err() {
                        trace!("stream consumer went away");
                        break;
                    }
                }
            }

            if closed {
                break;
            }
        }
        // dropping tx closes the channel
        trace!("response stream stopped");
    });

    rx
}
