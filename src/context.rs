//! Context aggregation.
//!
//! Collects the metadata sent alongside an error: the affected user, the
//! request being served, and grouped runtime/application/system facts.
//!
//! # Precedence
//!
//! | Value | 1st | 2nd | Fallback |
//! |-------|-----|-----|----------|
//! | user | persisted on the dispatcher | [`AppContextProvider::user`] | omitted |
//! | environment | persisted on the dispatcher | [`AppContextProvider::environment`] | `"unknown"` fields |
//! | request url | [`RequestData::url`] | [`AppContextProvider::current_url`] | omitted |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::event::{EnvironmentDescriptor, RequestData, UserRecord};

pub const RUNTIME_GROUP: &str = "Runtime";
pub const APP_GROUP: &str = "App";
pub const SYSTEM_GROUP: &str = "System";

const UNKNOWN: &str = "unknown";
const DEFAULT_METHOD: &str = "GET";

/// Ambient data supplied by the host application.
///
/// Every member is optional; the defaults report nothing.
pub trait AppContextProvider: Send + Sync {
    /// The currently signed-in user.
    fn user(&self) -> Option<UserRecord> {
        None
    }

    /// Deployment facts for the running application.
    fn environment(&self) -> Option<EnvironmentDescriptor> {
        None
    }

    /// Location of the page or route currently being served.
    fn current_url(&self) -> Option<String> {
        None
    }
}

/// Facts about the process the reporter runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// Platform identifier, mapped to an OS name by [`operating_system`]
    pub platform: String,
    pub version: Option<String>,
    pub user_agent: Option<String>,
}

impl RuntimeInfo {
    /// Describes the current process.
    ///
    /// The version is the compiler version exported by the build script.
    pub fn detect() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            version: option_env!("RUSTC_VERSION").map(String::from),
            user_agent: None,
        }
    }
}

impl Default for RuntimeInfo {
    fn default() -> Self {
        Self::detect()
    }
}

/// Maps a platform identifier to a display OS name.
pub fn operating_system(platform: &str) -> &'static str {
    match platform.to_ascii_lowercase().as_str() {
        "mac" | "macos" | "macintel" | "darwin" => "MacOS",
        "win32" | "windows" => "Windows",
        "linux" => "Linux",
        "android" => "Android",
        _ => "Unknown",
    }
}

/// A named bundle of related variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextGroup {
    pub group: String,
    pub variables: BTreeMap<String, String>,
}

impl ContextGroup {
    /// Creates a group with no variables.
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            variables: BTreeMap::new(),
        }
    }

    fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    fn set_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    fn set_or_unknown(self, key: &str, value: Option<&str>) -> Self {
        self.set(key, value.unwrap_or(UNKNOWN))
    }

    /// True when the group has no variables and would be dropped.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Method, url and route parameters of the captured request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub method: String,
    pub params: BTreeMap<String, String>,
}

/// Request section of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub request: RequestLine,
    pub headers: BTreeMap<String, String>,
    pub query_string: BTreeMap<String, String>,
    pub body: String,
}

impl RequestContext {
    /// Builds the request section, falling back to `location` for the url.
    pub fn from_request(request: &RequestData, location: Option<String>) -> Self {
        let url = request.url.clone().or(location);
        let query_string = url.as_deref().map(parse_query).unwrap_or_default();

        Self {
            request: RequestLine {
                url,
                method: request
                    .method
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_METHOD.to_string()),
                params: request.params.clone(),
            },
            headers: request.headers.clone(),
            query_string,
            body: request.body.clone().unwrap_or_default(),
        }
    }
}

/// Decodes the query component of `url` into key/value pairs.
///
/// Works on absolute and relative urls; the fragment is ignored and the
/// last occurrence of a repeated key wins.
pub fn parse_query(url: &str) -> BTreeMap<String, String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    match without_fragment.split_once('?') {
        Some((_, query)) => url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
        None => BTreeMap::new(),
    }
}

/// Everything the aggregator contributes to a payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContextSnapshot {
    pub groups: Vec<ContextGroup>,
    pub user: Option<UserRecord>,
    pub request: Option<RequestContext>,
}

/// Builds [`ContextSnapshot`]s for a given runtime.
#[derive(Debug, Clone, Default)]
pub struct ContextAggregator {
    runtime: RuntimeInfo,
}

impl ContextAggregator {
    /// Creates an aggregator reporting `runtime` in the Runtime and System groups.
    pub fn new(runtime: RuntimeInfo) -> Self {
        Self { runtime }
    }

    /// Runtime facts this aggregator reports.
    pub fn runtime(&self) -> &RuntimeInfo {
        &self.runtime
    }

    /// Resolves user, environment and request according to precedence and
    /// assembles the context groups.
    ///
    /// The provider is only consulted for values not already persisted.
    pub fn build(
        &self,
        persisted_user: Option<UserRecord>,
        persisted_env: Option<EnvironmentDescriptor>,
        provider: Option<&dyn AppContextProvider>,
        request: Option<&RequestData>,
    ) -> ContextSnapshot {
        let user = persisted_user.or_else(|| provider.and_then(|p| p.user()));
        let environment = persisted_env
            .or_else(|| provider.and_then(|p| p.environment()))
            .unwrap_or_default();
        let request = request.map(|r| {
            let location = match r.url {
                Some(_) => None,
                None => provider.and_then(|p| p.current_url()),
            };
            RequestContext::from_request(r, location)
        });

        ContextSnapshot {
            groups: self.groups(&environment),
            user,
            request,
        }
    }

    /// Runtime, application and system groups, minus any without variables.
    pub fn groups(&self, env: &EnvironmentDescriptor) -> Vec<ContextGroup> {
        let runtime = ContextGroup::new(RUNTIME_GROUP).set_opt("version", self.runtime.version.as_deref());

        let app = ContextGroup::new(APP_GROUP)
            .set_or_unknown("environment", env.environment.as_deref())
            .set_or_unknown("debug", env.debug.as_deref())
            .set_or_unknown("timezone", env.timezone.as_deref());

        let system = ContextGroup::new(SYSTEM_GROUP)
            .set("os", operating_system(&self.runtime.platform))
            .set_or_unknown("server", env.server.as_deref())
            .set_or_unknown("database", env.database.as_deref())
            .set_or_unknown("package_manager", env.package_manager_version.as_deref())
            .set_or_unknown("user_agent", self.runtime.user_agent.as_deref());

        [runtime, app, system]
            .into_iter()
            .filter(|g| !g.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        user: Option<UserRecord>,
        environment: Option<EnvironmentDescriptor>,
        url: Option<String>,
    }

    impl AppContextProvider for StaticProvider {
        fn user(&self) -> Option<UserRecord> {
            self.user.clone()
        }

        fn environment(&self) -> Option<EnvironmentDescriptor> {
            self.environment.clone()
        }

        fn current_url(&self) -> Option<String> {
            self.url.clone()
        }
    }

    /// Implements nothing, relying on the default members.
    struct SilentProvider;

    impl AppContextProvider for SilentProvider {}

    fn runtime(version: Option<&str>) -> RuntimeInfo {
        RuntimeInfo {
            platform: "linux".into(),
            version: version.map(String::from),
            user_agent: None,
        }
    }

    fn group<'a>(snapshot: &'a ContextSnapshot, name: &str) -> Option<&'a ContextGroup> {
        snapshot.groups.iter().find(|g| g.group == name)
    }

    #[test]
    fn app_group_defaults_to_unknown() {
        let snapshot = ContextAggregator::new(runtime(None)).build(None, None, None, None);

        let app = group(&snapshot, APP_GROUP).unwrap();
        assert_eq!(app.variables["environment"], "unknown");
        assert_eq!(app.variables["debug"], "unknown");
        assert_eq!(app.variables["timezone"], "unknown");
        assert_eq!(app.variables.len(), 3);
    }

    #[test]
    fn runtime_group_requires_known_version() {
        let without = ContextAggregator::new(runtime(None)).build(None, None, None, None);
        assert!(group(&without, RUNTIME_GROUP).is_none());

        let with = ContextAggregator::new(runtime(Some("1.80.0"))).build(None, None, None, None);
        assert_eq!(group(&with, RUNTIME_GROUP).unwrap().variables["version"], "1.80.0");
        assert_eq!(with.groups[0].group, RUNTIME_GROUP);
    }

    #[test]
    fn detect_reports_compiler_version() {
        let info = RuntimeInfo::detect();

        let version = info.version.clone().expect("build script exports RUSTC_VERSION");
        assert!(version.starts_with(|c: char| c.is_ascii_digit()), "{version}");
        assert_eq!(info.platform, std::env::consts::OS);

        let snapshot = ContextAggregator::new(info).build(None, None, None, None);
        assert_eq!(snapshot.groups[0].group, RUNTIME_GROUP);
    }

    #[test]
    fn groups_are_never_empty() {
        let snapshot = ContextAggregator::new(runtime(None)).build(None, None, None, None);

        assert!(snapshot.groups.iter().all(|g| !g.variables.is_empty()));
        let names: Vec<_> = snapshot.groups.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(names, vec![APP_GROUP, SYSTEM_GROUP]);
    }

    #[test]
    fn system_group_maps_platform() {
        let aggregator = ContextAggregator::new(RuntimeInfo {
            platform: "MacIntel".into(),
            version: None,
            user_agent: Some("Mozilla/5.0".into()),
        });
        let env = EnvironmentDescriptor::new("production").with_database("postgres");

        let system = aggregator
            .groups(&env)
            .into_iter()
            .find(|g| g.group == SYSTEM_GROUP)
            .unwrap();

        assert_eq!(system.variables["os"], "MacOS");
        assert_eq!(system.variables["database"], "postgres");
        assert_eq!(system.variables["server"], "unknown");
        assert_eq!(system.variables["user_agent"], "Mozilla/5.0");
    }

    #[test]
    fn operating_system_lookup() {
        assert_eq!(operating_system("win32"), "Windows");
        assert_eq!(operating_system("Linux"), "Linux");
        assert_eq!(operating_system("android"), "Android");
        assert_eq!(operating_system("freebsd"), "Unknown");
    }

    #[test]
    fn persisted_values_beat_provider() {
        let provider = StaticProvider {
            user: Some(UserRecord::new("provider")),
            environment: Some(EnvironmentDescriptor::new("staging")),
            url: None,
        };

        let snapshot = ContextAggregator::new(runtime(None)).build(
            Some(UserRecord::new("persisted")),
            Some(EnvironmentDescriptor::new("production")),
            Some(&provider),
            None,
        );

        assert_eq!(snapshot.user.as_ref().unwrap().id, "persisted");
        assert_eq!(group(&snapshot, APP_GROUP).unwrap().variables["environment"], "production");
    }

    #[test]
    fn provider_fills_missing_values() {
        let provider = StaticProvider {
            user: Some(UserRecord::new(7).with_email("a@example.com")),
            environment: Some(EnvironmentDescriptor::new("staging").with_timezone("UTC")),
            url: None,
        };

        let snapshot = ContextAggregator::new(runtime(None)).build(None, None, Some(&provider), None);

        assert_eq!(snapshot.user.as_ref().unwrap().email.as_deref(), Some("a@example.com"));
        let app = group(&snapshot, APP_GROUP).unwrap();
        assert_eq!(app.variables["environment"], "staging");
        assert_eq!(app.variables["timezone"], "UTC");
        assert_eq!(app.variables["debug"], "unknown");
    }

    #[test]
    fn provider_without_members_yields_defaults() {
        let snapshot = ContextAggregator::new(runtime(None)).build(None, None, Some(&SilentProvider), None);

        assert!(snapshot.user.is_none());
        assert_eq!(group(&snapshot, APP_GROUP).unwrap().variables["environment"], "unknown");
    }

    #[test]
    fn request_only_built_when_supplied() {
        let snapshot = ContextAggregator::new(runtime(None)).build(None, None, None, None);
        assert!(snapshot.request.is_none());
    }

    #[test]
    fn request_captures_fields_and_query() {
        let request = RequestData::new("POST", "https://shop.example.com/cart?item=42&coupon=SAVE%2010#top")
            .with_header("accept", "text/html")
            .with_param("id", "9")
            .with_body("{\"qty\":1}");

        let snapshot = ContextAggregator::new(runtime(None)).build(None, None, None, Some(&request));
        let ctx = snapshot.request.unwrap();

        assert_eq!(ctx.request.method, "POST");
        assert_eq!(ctx.request.params["id"], "9");
        assert_eq!(ctx.headers["accept"], "text/html");
        assert_eq!(ctx.query_string["item"], "42");
        assert_eq!(ctx.query_string["coupon"], "SAVE 10");
        assert_eq!(ctx.body, "{\"qty\":1}");
    }

    #[test]
    fn request_defaults_method_and_body() {
        let ctx = RequestContext::from_request(&RequestData::default(), None);

        assert_eq!(ctx.request.method, "GET");
        assert_eq!(ctx.request.url, None);
        assert_eq!(ctx.body, "");
        assert!(ctx.query_string.is_empty());
    }

    #[test]
    fn request_url_falls_back_to_provider_location() {
        let provider = StaticProvider {
            user: None,
            environment: None,
            url: Some("/orders?page=2".into()),
        };

        let snapshot = ContextAggregator::new(runtime(None)).build(
            None,
            None,
            Some(&provider),
            Some(&RequestData::default()),
        );
        let ctx = snapshot.request.unwrap();

        assert_eq!(ctx.request.url.as_deref(), Some("/orders?page=2"));
        assert_eq!(ctx.query_string["page"], "2");
    }

    #[test]
    fn url_is_omitted_from_json_when_unknown() {
        let ctx = RequestContext::from_request(&RequestData::default(), None);
        let json = serde_json::to_value(&ctx).unwrap();

        assert!(json["request"].get("url").is_none());
        assert_eq!(json["request"]["method"], "GET");
    }
}
