//! meshcfg sink
//!
//! Receives configuration pushed by a remote source over a framed,
//! bidirectional stream and republishes it as canonical events.
//!
//! # Stream flow
//!
//! ```text
//! source                                   sink
//!   │◀── RequestResources (per collection) ──│
//!   │─── Resources (full state, nonce) ─────▶│ Updater::apply
//!   │◀── RequestResources (ACK / NACK) ──────│
//! ```
//!
//! Admission runs before the sink sees a stream: the rate limiter first,
//! then the auth checker.

pub mod auth;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod rate;
pub mod server;
pub mod sink;
pub mod stream;
pub mod types;

pub use auth::{AllowAll, AuthChecker, AuthMode, ListAuthChecker};
pub use error::{AuthError, Code, ProtocolError, RateLimitError, Status, StreamError, UpdateError};
pub use metrics::SINK_METRICS;
pub use protocol::{Header, Message, OpCode, HEADER_SIZE, PROTOCOL_VERSION};
pub use rate::{RateLimiter, TokenBucket, Unlimited};
pub use server::{Acceptor, Server, ServerOptions};
pub use sink::{Change, EventUpdater, Sink, SinkOptions, StreamProcessor, Updater};
pub use stream::{AuthInfo, Peer, ResourceStream, StreamContext, TcpResourceStream};
pub use types::{ErrorDetail, RequestResources, Resources, SinkNode, WireMetadata, WireResource};
