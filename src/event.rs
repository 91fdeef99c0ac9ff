//! Inputs supplied by the host application.
//!
//! [`ErrorEvent`] and [`RequestData`] are transient and passed per call;
//! [`UserRecord`] and [`EnvironmentDescriptor`] may also be persisted on a
//! [`Dispatcher`](crate::Dispatcher) and reused across calls.

use std::backtrace::Backtrace;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A captured application error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Error type name (e.g. `TypeError`, `io::Error`)
    pub name: Option<String>,

    /// Human readable message
    pub message: Option<String>,

    /// Raw, unparsed stack trace text
    pub stack: Option<String>,
}

impl ErrorEvent {
    /// Creates an event without stack text.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: Some(message.into()),
            stack: None,
        }
    }

    /// Returns a copy carrying the given raw stack text.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Captures a Rust error together with a backtrace of the current thread.
    ///
    /// The name is the unqualified type name of `E`. The backtrace is forced,
    /// so it is collected regardless of `RUST_BACKTRACE`, and rewritten to
    /// `at function (file:line:col)` lines starting at the caller. Frames
    /// without debug info carry no location and are left out.
    #[inline(never)]
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let name = short_type_name(full);
        let backtrace = Backtrace::force_capture().to_string();

        Self {
            name: Some(name.to_string()),
            message: Some(error.to_string()),
            stack: Some(call_site_stack(&backtrace)),
        }
    }

    /// Stack text if present and not blank.
    pub fn usable_stack(&self) -> Option<&str> {
        self.stack.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Strips module paths from a type name, keeping generic arguments readable.
///
/// `std::io::error::Error` becomes `Error`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

/// Symbols of the frames recorded by the capture itself.
const CAPTURE_SYMBOLS: [&str; 2] = ["std::backtrace", concat!(module_path!(), "::ErrorEvent::from_error")];

/// Rewrites std backtrace text into `at function (file:line:col)` lines.
///
/// std prints each symbol on its own line (`  3: my_app::load`), followed by
/// an indented `at file:line:col` line when the location is known.
fn call_site_stack(backtrace: &str) -> String {
    let mut symbols: Vec<(&str, Option<&str>)> = Vec::new();
    for line in backtrace.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(last) = symbols.last_mut() {
                last.1 = Some(location);
            }
        } else if !line.is_empty() {
            let symbol = match line.split_once(": ") {
                Some((index, name)) if index.chars().all(|c| c.is_ascii_digit()) => name,
                _ => line,
            };
            symbols.push((symbol, None));
        }
    }

    symbols
        .into_iter()
        .skip_while(|(symbol, _)| CAPTURE_SYMBOLS.iter().any(|prefix| symbol.starts_with(prefix)))
        .filter_map(|(symbol, location)| {
            let location = location?;
            Some(if has_column(location) {
                format!("    at {symbol} ({location})")
            } else {
                format!("    at {symbol} ({location}:0)")
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn has_column(location: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let mut parts = location.rsplitn(3, ':');
    matches!((parts.next(), parts.next(), parts.next()), (Some(col), Some(line), Some(_)) if digits(col) && digits(line))
}

/// The user affected by an error.
///
/// Only `id` is required; any other keys the host adds are carried through
/// to the payload unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// String or numeric identifier
    pub id: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserRecord {
    /// Creates a user record with only an identifier.
    pub fn new(id: impl Into<serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Adds a host-defined attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Deployment facts about the running application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    /// Deployment name, e.g. `production`
    pub environment: Option<String>,
    pub debug: Option<String>,
    pub timezone: Option<String>,
    pub server: Option<String>,
    pub database: Option<String>,
    pub package_manager_version: Option<String>,
}

impl EnvironmentDescriptor {
    /// Creates a descriptor naming only the deployment.
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: Some(environment.into()),
            ..Self::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug.to_string());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_package_manager_version(mut self, version: impl Into<String>) -> Self {
        self.package_manager_version = Some(version.into());
        self
    }
}

/// The inbound request being served when the error happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    /// Full URL including query string
    pub url: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RequestData {
    /// Creates request data with a method and url.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            method: Some(method.into()),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_type_name_strips_module_path() {
        assert_eq!(short_type_name("std::io::error::Error"), "Error");
        assert_eq!(short_type_name("MyError"), "MyError");
        assert_eq!(
            short_type_name("my_crate::Wrapper<alloc::string::String>"),
            "Wrapper<alloc::string::String>"
        );
    }

    #[test]
    fn from_error_captures_name_message_and_stack() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml missing");
        let event = ErrorEvent::from_error(&io);

        assert_eq!(event.name.as_deref(), Some("Error"));
        assert_eq!(event.message.as_deref(), Some("config.toml missing"));
        assert!(event.stack.is_some());
    }

    #[test]
    fn backtrace_is_rewritten_from_the_caller() {
        let backtrace = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:312:9
   1: debugmate::event::ErrorEvent::from_error
             at ./src/event.rs:52:27
   2: my_app::config::load
             at ./src/config.rs:14:20
   3: <F as core::ops::function::FnOnce<()>>::call_once
             at ./src/main.rs:7
   4: __libc_start_main
   5: _start";

        let stack = call_site_stack(backtrace);

        assert_eq!(
            stack,
            "    at my_app::config::load (./src/config.rs:14:20)\n    \
             at <F as core::ops::function::FnOnce<()>>::call_once (./src/main.rs:7:0)"
        );
    }

    #[test]
    fn backtrace_without_locations_is_empty() {
        let stack = call_site_stack("   0: <unknown>\n   1: <unknown>");
        assert_eq!(stack, "");
    }

    #[test]
    fn blank_stack_is_not_usable() {
        let event = ErrorEvent::new("Error", "boom").with_stack("  \n\n ");
        assert_eq!(event.usable_stack(), None);

        let event = ErrorEvent::new("Error", "boom");
        assert_eq!(event.usable_stack(), None);
    }

    #[test]
    fn user_extra_attributes_are_flattened() {
        let user = UserRecord::new(42)
            .with_name("Jane Doe")
            .with_attribute("plan", "pro");

        let json = serde_json::to_value(&user).unwrap();

        assert_eq!(json["id"], 42);
        assert_eq!(json["name"], "Jane Doe");
        assert_eq!(json["plan"], "pro");
        assert!(json.get("email").is_none());
    }
}
