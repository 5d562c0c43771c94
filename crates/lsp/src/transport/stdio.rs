use tokio::io::{BufReader, Stdin, Stdout};

use super::{ConnectedFlag, Transport};

/// The standard transport for a server launched by an editor: framed
/// messages on stdin/stdout, logging left free to go to stderr.
#[derive(Debug, Default)]
pub struct StdioTransport {
    flag: ConnectedFlag,
}

impl StdioTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for StdioTransport {
    type Reader = BufReader<Stdin>;
    type Writer = Stdout;
    type Handle = ConnectedFlag;

    fn handle(&self) -> Self::Handle {
        self.flag.clone()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        (BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}
