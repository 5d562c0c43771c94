use tokio::io::{BufReader, DuplexStream, ReadHalf, WriteHalf};

use super::{ConnectedFlag, Transport};

const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// One end of an in-memory transport pair, for wiring two [`crate::Connection`]s
/// together in tests without touching a real socket or process.
#[derive(Debug)]
pub struct MemoryTransport {
    stream: DuplexStream,
    flag: ConnectedFlag,
}

impl Transport for MemoryTransport {
    type Reader = BufReader<ReadHalf<DuplexStream>>;
    type Writer = WriteHalf<DuplexStream>;
    type Handle = ConnectedFlag;

    fn handle(&self) -> Self::Handle {
        self.flag.clone()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (reader, writer) = tokio::io::split(self.stream);
        (BufReader::new(reader), writer)
    }
}

/// Creates a connected pair of in-memory transports: bytes written to one
/// side's writer appear on the other side's reader.
#[must_use]
pub fn memory_pair() -> (MemoryTransport, MemoryTransport) {
    let (a, b) = tokio::io::duplex(DEFAULT_BUF_SIZE);
    (
        MemoryTransport {
            stream: a,
            flag: ConnectedFlag::new(),
        },
        MemoryTransport {
            stream: b,
            flag: ConnectedFlag::new(),
        },
    )
}
