use tokio::io::{BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use super::{ConnectedFlag, Transport};

/// A TCP transport, for servers run out-of-process from their client (the
/// `--tcp <port>` shape of language server CLIs). Host resolution goes
/// through the OS resolver via [`TcpStream::connect`], which accepts any
/// `ToSocketAddrs` implementor including `"host:port"` strings.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    flag: ConnectedFlag,
}

impl TcpTransport {
    /// Connects to `host:port`, resolving `host` if it isn't already an IP
    /// address.
    pub async fn connect(host: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream,
            flag: ConnectedFlag::new(),
        })
    }

    /// Wraps an already-accepted connection, as a server listening on a
    /// bound port would use per client.
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            flag: ConnectedFlag::new(),
        }
    }
}

impl Transport for TcpTransport {
    type Reader = BufReader<ReadHalf<TcpStream>>;
    type Writer = WriteHalf<TcpStream>;
    type Handle = ConnectedFlag;

    fn handle(&self) -> Self::Handle {
        self.flag.clone()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (reader, writer) = tokio::io::split(self.stream);
        (BufReader::new(reader), writer)
    }
}
