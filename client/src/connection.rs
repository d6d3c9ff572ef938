//! Framed reads and writes over a TCP stream

use bytes::Bytes;
use shared::{encode_frame, FrameDecoder};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

const READ_BUFFER_SIZE: usize = 4096;

/// Connects and splits the stream into a framed reader and writer
pub async fn connect<A: ToSocketAddrs>(
    addr: A,
) -> io::Result<(FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();
    Ok((FrameReader::new(read_half), FrameWriter::new(write_half)))
}

/// Yields whole payloads from a byte stream
pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
        }
    }

    /// Next complete payload, or `None` once the peer has closed the stream
    ///
    /// Oversized frames surface as [`io::ErrorKind::InvalidData`].
    pub async fn next_payload(&mut self) -> io::Result<Option<Bytes>> {
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            if let Some(payload) = self
                .decoder
                .next_frame()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            {
                return Ok(Some(payload));
            }

            let n = self.inner.read(&mut buffer).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.extend(&buffer[..n]);
        }
    }

    /// Like [`Self::next_payload`] but decodes the payload as text
    pub async fn next_text(&mut self) -> io::Result<Option<String>> {
        Ok(self
            .next_payload()
            .await?
            .map(|payload| String::from_utf8_lossy(&payload).into_owned()))
    }
}

/// Writes payloads as frames
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Sends one command line, appending the `\n` terminator
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.send_payload(format!("{}\n", line).as_bytes()).await
    }

    pub async fn send_payload(&mut self, payload: &[u8]) -> io::Result<()> {
        let frame =
            encode_frame(payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.inner.write_all(&frame).await
    }

    /// Writes bytes as-is, bypassing framing
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes).await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
