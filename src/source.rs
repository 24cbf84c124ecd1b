use crate::endpoint::{StreamEndpoint, StreamVariant};
use crate::error::{ConnectError, ReadError};
use crate::frame::Frame;
use std::future::Future;

/// An open stream. Dropping it closes the connection.
pub trait FrameReader: Send {
    /// Next decoded frame, before any per-camera transform.
    fn read_frame(&mut self) -> impl Future<Output = Result<Frame, ReadError>> + Send;
}

/// Opens readers for an endpoint at a given variant. One connector is shared
/// by every producer.
pub trait StreamConnector: Send + Sync + 'static {
    type Reader: FrameReader + 'static;

    fn connect(
        &self,
        endpoint: &StreamEndpoint,
        variant: StreamVariant,
    ) -> impl Future<Output = Result<Self::Reader, ConnectError>> + Send;
}
