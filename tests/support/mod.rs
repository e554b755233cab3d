use std::net::SocketAddr;

use tcprcon::packet::{self, Packet};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// Scripted rcon server for a single connection. The responder gets every
/// decoded packet and returns the packets to answer with, or `None` to hang
/// up.
pub struct FakeServer {
    pub addr: SocketAddr,
    handle: JoinHandle<Vec<Packet>>,
}

impl FakeServer {
    pub async fn start<F>(mut responder: F) -> FakeServer
    where
        F: FnMut(&Packet) -> Option<Vec<Packet>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            while let Ok(packet) = packet::decode(&mut stream).await {
                let reply = responder(&packet);
                received.push(packet);
                match reply {
                    Some(replies) => write_all(&mut stream, &replies).await,
                    None => break,
                }
            }
            received
        });

        FakeServer { addr, handle }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Everything the client sent before the connection ended.
    pub async fn received(self) -> Vec<Packet> {
        self.handle.await.unwrap()
    }
}

async fn write_all(stream: &mut TcpStream, packets: &[Packet]) {
    for packet in packets {
        stream.write_all(&packet.encode()).await.unwrap();
    }
}
