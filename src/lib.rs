//! Debugmate - error capture and delivery for Rust applications
//!
//! Captures an error, normalizes its stack trace, attaches user, request and
//! environment context, and posts the result to a Debugmate collection
//! endpoint. Reporting never fails the host: every problem along the way is
//! logged through `tracing` and dropped.
//!
//! # Features
//!
//! - Stack trace parsing into ordered frames, with optional source previews
//! - Context precedence: persisted overrides, then an app context provider
//! - Single-attempt JSON delivery with token authentication
//!
//! # Example
//!
//! ```rust,no_run
//! use debugmate::{Dispatcher, DispatcherConfig, ErrorEvent, UserRecord};
//!
//! # async fn run() {
//! let dispatcher = Dispatcher::new(DispatcherConfig::new(
//!     "https://debugmate.example.com",
//!     "my-token",
//! ));
//! dispatcher.set_user(UserRecord::new(42).with_email("jane@example.com"));
//!
//! let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
//! dispatcher.publish(Some(&ErrorEvent::from_error(&err)), None).await;
//! # }
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod payload;
pub mod stack;
pub mod transport;

pub use config::DispatcherConfig;
pub use context::{AppContextProvider, ContextAggregator, ContextGroup, ContextSnapshot, RequestContext, RuntimeInfo};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{ConfigError, EnrichmentError, ReportError, StackError, TransportError};
pub use event::{EnvironmentDescriptor, ErrorEvent, RequestData, UserRecord};
pub use payload::Payload;
pub use stack::{
    parse_stack, DefaultSourceFetcher, FsSourceFetcher, HttpSourceFetcher, SourceFetcher, StackFrame,
    StackTraceResolver,
};
pub use transport::{HttpTransport, Transport};
