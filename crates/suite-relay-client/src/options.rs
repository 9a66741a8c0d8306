//! Options for the client bootstrap page and the URL that carries them.

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};
use url::{Url, form_urlencoded};

/// Client page, relative to the proxy root.
pub const CLIENT_PAGE: &str = "__intern/client.html";

/// Reporter used by the client page when no descriptor object is configured.
pub const DEFAULT_CLIENT_REPORTER: &str = "WebDriver";

/// Options derived by the controller for one remote run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedOptions {
    /// Proxy root path as seen by the browser.
    pub base_path: String,
    /// Proxy path of the controller's working directory.
    pub initial_base_url: String,
    /// Serialized reporter descriptor.
    pub reporters: String,
    pub root_suite_name: String,
    pub session_id: String,
}

impl DerivedOptions {
    const KEYS: [&'static str; 5] = [
        "basePath",
        "initialBaseUrl",
        "reporters",
        "rootSuiteName",
        "sessionId",
    ];

    fn pairs(&self) -> [(&'static str, &str); 5] {
        [
            ("basePath", &self.base_path),
            ("initialBaseUrl", &self.initial_base_url),
            ("reporters", &self.reporters),
            ("rootSuiteName", &self.root_suite_name),
            ("sessionId", &self.session_id),
        ]
    }
}

/// Everything passed to the client page.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Caller run arguments, minus any names the derived options define.
    pub args: Map<String, Value>,
    pub derived: DerivedOptions,
}

impl ClientOptions {
    /// Merge caller run arguments with derived options.
    ///
    /// Derived options win over same-named arguments.
    #[must_use]
    pub fn merge(args: &Map<String, Value>, derived: DerivedOptions) -> Self {
        let args = args
            .iter()
            .filter(|(k, _)| !DerivedOptions::KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self { args, derived }
    }

    /// URL-encoded query string.
    ///
    /// Arrays become repeated keys, objects are JSON-encoded and nulls are
    /// empty values.
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.args {
            match value {
                Value::Array(items) => {
                    for item in items {
                        query.append_pair(key, &scalar(item));
                    }
                }
                other => {
                    query.append_pair(key, &scalar(other));
                }
            }
        }
        for (key, value) in self.derived.pairs() {
            query.append_pair(key, value);
        }
        query.finish()
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serialize the configured client reporter.
///
/// Objects are JSON-encoded; anything else selects the default reporter.
#[must_use]
pub fn reporter_spec(descriptor: Option<&Value>) -> String {
    match descriptor {
        Some(Value::Object(map)) => Value::Object(map.clone()).to_string(),
        _ => DEFAULT_CLIENT_REPORTER.to_string(),
    }
}

/// Parse the proxy URL, normalizing its path to end with `/`.
///
/// # Errors
/// Returns error if `proxy_url` is not an absolute URL.
pub fn proxy_root(proxy_url: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(proxy_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Proxy path of `working_dir`, given the directory served at `base_path`.
#[must_use]
pub fn initial_base_url(proxy_base_path: &str, base_path: &Path, working_dir: &Path) -> String {
    let base = normalize(&working_dir.join(base_path));
    let relative = pathdiff::diff_paths(normalize(working_dir), base).unwrap_or_default();
    let relative = relative.to_string_lossy().replace('\\', "/");
    format!("{proxy_base_path}{relative}")
}

// Lexically resolve `.` and `..` so diffing sees plain components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// URL of the client bootstrap page carrying `options`.
///
/// # Errors
/// Returns error if `proxy_url` is not an absolute URL.
pub fn client_url(proxy_url: &str, options: &ClientOptions) -> Result<Url, url::ParseError> {
    let mut url = proxy_root(proxy_url)?.join(CLIENT_PAGE)?;
    url.set_query(Some(&options.to_query()));
    Ok(url)
}
