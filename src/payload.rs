//! Wire payload assembly.
//!
//! ```json
//! {
//!   "exception": "TypeError",
//!   "message": "x is not a function",
//!   "file": "app.js",
//!   "type": "web",
//!   "trace": [{"function": "foo", "file": "app.js", "line": 10, "column": 5, "preview": null}],
//!   "user": {"id": 1, "name": "Jane"},
//!   "request": {"request": {"url": "...", "method": "GET", "params": {}}, "headers": {}, "query_string": {}, "body": ""},
//!   "environment": [{"group": "App", "variables": {"environment": "production", ...}}]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::context::{ContextGroup, ContextSnapshot, RequestContext};
use crate::event::{ErrorEvent, UserRecord};
use crate::stack::StackFrame;

pub const DEFAULT_EXCEPTION: &str = "UnknownError";
pub const DEFAULT_MESSAGE: &str = "An unknown error occurred";
pub const PAYLOAD_TYPE: &str = "web";

/// Context keys merged into the top level of the payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayloadContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestContext>,

    /// Context groups
    #[serde(default)]
    pub environment: Vec<ContextGroup>,
}

impl From<ContextSnapshot> for PayloadContext {
    fn from(snapshot: ContextSnapshot) -> Self {
        Self {
            user: snapshot.user,
            request: snapshot.request,
            environment: snapshot.groups,
        }
    }
}

/// The JSON document delivered to the collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub exception: String,
    pub message: String,
    /// Always equal to `trace[0].file`
    pub file: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Never empty
    pub trace: Vec<StackFrame>,
    #[serde(flatten)]
    pub context: PayloadContext,
}

impl Payload {
    /// Combines an error, its frames and the aggregated context.
    ///
    /// An empty frame list is replaced by a single unknown frame.
    pub fn build(error: &ErrorEvent, frames: Vec<StackFrame>, context: ContextSnapshot) -> Self {
        let trace = if frames.is_empty() {
            vec![StackFrame::unknown()]
        } else {
            frames
        };
        let file = trace[0].file.clone();

        Self {
            exception: non_blank(error.name.as_deref()).unwrap_or(DEFAULT_EXCEPTION).to_string(),
            message: non_blank(error.message.as_deref()).unwrap_or(DEFAULT_MESSAGE).to_string(),
            file,
            kind: PAYLOAD_TYPE.to_string(),
            trace,
            context: context.into(),
        }
    }

    /// Serializes the payload to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}
