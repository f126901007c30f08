pub mod automation;
pub mod config;
pub mod error;
pub mod identity;
pub mod invocation;

pub use automation::{AutomationClient, DownstreamReply};
pub use config::{AllowedOrigins, RelayConfig};
pub use error::{ConfigError, DownstreamError, IdentityError, RequestError};
pub use identity::IdentityPolicy;
pub use invocation::{Invocation, OutboundPayload};
