use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::SwarmError;

/// Write half of a transport connection to the master.
#[async_trait]
pub trait FrameWriter: Send {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), SwarmError>;
    async fn close(&mut self);
}

/// Read half of a transport connection to the master.
#[async_trait]
pub trait FrameReader: Send {
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    async fn recv_frame(&mut self) -> Result<Option<Bytes>, SwarmError>;
}

/// A connected transport to the master, split into independent read/write
/// halves so the client can drive sends and receives from separate tasks
/// without one blocking the other.
pub trait MasterTransport: Send {
    fn split(self: Box<Self>) -> (Box<dyn FrameWriter>, Box<dyn FrameReader>);
}

/// A length-delimited framing over a plain TCP connection, standing in for
/// the ZMTP-style transport the wire contract is specified against.
pub struct TcpTransport {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl TcpTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self, SwarmError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        Self { framed }
    }
}

impl MasterTransport for TcpTransport {
    fn split(self: Box<Self>) -> (Box<dyn FrameWriter>, Box<dyn FrameReader>) {
        let (sink, stream) = self.framed.split();
        (Box::new(TcpWriter { sink }), Box::new(TcpReader { stream }))
    }
}

struct TcpWriter {
    sink: SplitSink<Framed<TcpStream, LengthDelimitedCodec>, Bytes>,
}

#[async_trait]
impl FrameWriter for TcpWriter {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), SwarmError> {
        self.sink
            .send(frame)
            .await
            .map_err(|e| SwarmError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}

struct TcpReader {
    stream: SplitStream<Framed<TcpStream, LengthDelimitedCodec>>,
}

#[async_trait]
impl FrameReader for TcpReader {
    async fn recv_frame(&mut self) -> Result<Option<Bytes>, SwarmError> {
        match self.stream.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes.freeze())),
            Some(Err(e)) => Err(SwarmError::Transport(e.to_string())),
            None => Ok(None),
        }
    }
}
