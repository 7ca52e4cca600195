//! Upstream forwarding.
//!
//! # Data Flow
//! ```text
//! Router selects the connector stage
//!     → connector.rs forward() rewrites the URI and sends via the hyper client
//!         → transport.rs UpstreamDialer (resolved address, deadline)
//!         → transport.rs PooledStream (BufferPool entry on the read side)
//!     → backend response streamed back, or 502 / 504
//! ```

pub mod connector;
pub mod transport;

pub use connector::{is_timeout, Liveness, UpstreamConnector};
pub use transport::{Deadline, PooledConnection, PooledStream, UpstreamDialer};
