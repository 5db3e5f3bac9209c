pub mod error;
pub mod request;
pub mod transport;

pub use error::TransportError;
pub use request::{DEFAULT_RESPONSE_LIMIT, OutboundRequest, TransportResponse};
pub use transport::{DynTransport, Transport};
