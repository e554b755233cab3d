use std::{
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use log::trace;
use tokio::{
    io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf},
    net::TcpStream,
    time::{sleep_until, timeout_at, Instant, Sleep},
};

use crate::error::RconError;

/// A connection to a rcon server. Owns the socket and the request id counter.
///
/// Ids are handed out by the caller: read [Transport::current_id] before
/// writing a packet, the counter moves on by one after every write.
///
/// For streaming use the transport is split with [Transport::into_split] so a
/// background task can own the [Reader] while the [Writer] keeps sending.
pub struct Transport<S = TcpStream> {
    address: String,
    reader: Reader<S>,
    writer: Writer<S>,
}

impl Transport<TcpStream> {
    pub async fn connect(address: &str) -> Result<Self, RconError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(RconError::UnreachableHost)?;

        trace!("opened tcp stream to {}", address);

        Ok(Self::from_stream(address, stream))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Wraps an already established stream. The id counter starts at 0.
    pub fn from_stream(address: &str, stream: S) -> Self {
        let (read_half, write_half) = split(stream);
        Transport {
            address: address.to_owned(),
            reader: Reader {
                inner: read_half,
                deadline: None,
            },
            writer: Writer {
                inner: write_half,
                next_id: 0,
                deadline: None,
            },
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn current_id(&self) -> i32 {
        self.writer.current_id()
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<usize, RconError> {
        self.writer.write(bytes).await
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RconError> {
        self.reader.read(buf).await
    }

    pub fn set_read_deadline(&mut self, deadline: Instant) {
        self.reader.set_read_deadline(deadline);
    }

    /// Sets both the read and the write deadline.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.reader.set_read_deadline(deadline);
        self.writer.set_write_deadline(deadline);
    }

    pub fn into_split(self) -> (Reader<S>, Writer<S>) {
        (self.reader, self.writer)
    }

    pub async fn close(self) -> Result<(), RconError> {
        self.writer.close().await
    }
}

impl<S> AsyncRead for Transport<S>
where
    S: AsyncRead,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

/// Read half of a [Transport]. Reads fail with [io::ErrorKind::TimedOut] once
/// the armed deadline has passed; the deadline stays armed until replaced.
pub struct Reader<S = TcpStream> {
    inner: ReadHalf<S>,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<S> Reader<S>
where
    S: AsyncRead,
{
    pub fn set_read_deadline(&mut self, deadline: Instant) {
        match self.deadline.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.deadline = Some(Box::pin(sleep_until(deadline))),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RconError> {
        AsyncReadExt::read(self, buf)
            .await
            .map_err(RconError::from_read)
    }
}

impl<S> AsyncRead for Reader<S>
where
    S: AsyncRead,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(deadline) = self.deadline.as_mut() {
            if deadline.as_mut().poll(cx).is_ready() {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "read deadline exceeded",
                )));
            }
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Write half of a [Transport], holding the request id counter.
pub struct Writer<S = TcpStream> {
    inner: WriteHalf<S>,
    next_id: i32,
    deadline: Option<Instant>,
}

impl<S> Writer<S>
where
    S: AsyncWrite,
{
    pub fn current_id(&self) -> i32 {
        self.next_id
    }

    pub fn set_write_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Writes one encoded packet. The id counter is bumped whether or not the
    /// write succeeds, so always pass exactly one packet per call.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<usize, RconError> {
        let result = match self.deadline {
            Some(deadline) => match timeout_at(deadline, self.inner.write_all(bytes)).await {
                Ok(written) => written.map_err(RconError::SendError),
                Err(_) => Err(RconError::DeadlineExceeded),
            },
            None => self.inner.write_all(bytes).await.map_err(RconError::SendError),
        };
        self.next_id = self.next_id.wrapping_add(1);
        trace!("wrote {} bytes, next id is {}", bytes.len(), self.next_id);

        result.map(|()| bytes.len())
    }

    /// Shuts the socket down. Takes `self` so a connection can only be closed
    /// once; the read half is released when its owner drops it.
    pub async fn close(mut self) -> Result<(), RconError> {
        trace!("closing connection");
        self.inner.shutdown().await.map_err(RconError::CloseError)
    }
}
