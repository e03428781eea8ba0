//! Byte streams to a server.
use std::fmt;
use std::io::Result;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::connstring::Host;

/// A bidirectional byte stream to a server.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> AsyncStream for T {}

pub type Stream = Box<dyn AsyncStream>;

/// Opens streams for transports other than plain TCP, such as in-process servers.
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, host: &Host) -> Result<Stream>;
}

/// Encapsulates the functionality for how to connect to the server.
#[derive(Clone)]
pub enum StreamConnector {
    /// Connect to the server through a regular TCP stream.
    Tcp,
    /// Connect through a caller-provided transport.
    Custom(Arc<dyn Connect>),
}

impl Default for StreamConnector {
    fn default() -> Self {
        StreamConnector::Tcp
    }
}

impl fmt::Debug for StreamConnector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StreamConnector::Tcp => f.write_str("Tcp"),
            StreamConnector::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl StreamConnector {
    pub fn custom<C: Connect + 'static>(connector: C) -> StreamConnector {
        StreamConnector::Custom(Arc::new(connector))
    }

    pub async fn connect(&self, host: &Host) -> Result<Stream> {
        match *self {
            StreamConnector::Tcp => {
                let stream = TcpStream::connect((host.host_name.as_str(), host.port)).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            StreamConnector::Custom(ref connector) => connector.connect(host).await,
        }
    }
}
