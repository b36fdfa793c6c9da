/// Configuration for the portal client: page paths, form field names, and
/// transport policy. Districts differ only in these values, never in parsing.
use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_backoff_base_ms() -> u64 {
    250
}

const fn default_max_redirects() -> usize {
    10
}

const fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_scale() -> String {
    "six_point".to_string()
}

fn default_logged_in_marker() -> String {
    "a[href*='LogOff']".to_string()
}

/// Page paths relative to the portal base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortalPaths {
    pub login: String,
    pub logoff: String,
    pub validate: String,
    pub assignments: String,
    pub classes: String,
    pub report_card: String,
}

impl Default for PortalPaths {
    fn default() -> Self {
        Self {
            login: "/HomeAccess/Account/LogOn?ReturnUrl=%2fHomeAccess%2f".to_string(),
            logoff: "/HomeAccess/Account/LogOff".to_string(),
            validate: "/HomeAccess/Home/WeekView".to_string(),
            assignments: "/HomeAccess/Content/Student/Assignments.aspx".to_string(),
            classes: "/HomeAccess/Content/Student/Classes.aspx".to_string(),
            report_card: "/HomeAccess/Content/Student/ReportCards.aspx".to_string(),
        }
    }
}

/// Login form layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginForm {
    pub username_field: String,
    pub password_field: String,
    /// Fields every district posts verbatim (e.g. its `Database` id)
    pub static_fields: BTreeMap<String, String>,
    /// Element rendered when the portal rejects the credentials
    pub error_selector: String,
}

impl Default for LoginForm {
    fn default() -> Self {
        let mut static_fields = BTreeMap::new();
        static_fields.insert(
            "VerificationOption".to_string(),
            "UsernamePassword".to_string(),
        );
        static_fields.insert("Database".to_string(), "10".to_string());

        Self {
            username_field: "LogOnDetails.UserName".to_string(),
            password_field: "LogOnDetails.Password".to_string(),
            static_fields,
            error_selector: ".validation-summary-errors".to_string(),
        }
    }
}

/// Top-level portal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    /// Portal used when a login request does not name one
    #[serde(default)]
    pub base_url: Option<String>,
    /// Hosts a caller may name in `portalBaseUrl`; empty allows any
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    #[serde(default)]
    pub paths: PortalPaths,
    #[serde(default)]
    pub login: LoginForm,
    /// CSS selector present on every page of a logged-in session
    #[serde(default = "default_logged_in_marker")]
    pub logged_in_marker: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Retries after the first attempt, for network failures and 5xx
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Scale used for the `gpa` field of fetched courses
    #[serde(default = "default_scale")]
    pub default_scale: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            allowed_hosts: Vec::new(),
            paths: PortalPaths::default(),
            login: LoginForm::default(),
            logged_in_marker: default_logged_in_marker(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            session_ttl_secs: default_session_ttl_secs(),
            default_scale: default_scale(),
        }
    }
}

impl PortalConfig {
    /// Loads a portal configuration from a JSON file.
    ///
    /// Missing keys fall back to their defaults, so a district file only needs
    /// the values it overrides.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        // Capped well below chrono's range limit
        chrono::Duration::seconds(self.session_ttl_secs.min(u64::from(u32::MAX)) as i64)
    }

    /// Resolves the portal a login should talk to.
    ///
    /// A caller-supplied URL must be http(s) and, when an allow-list is
    /// configured, name one of its hosts.
    pub fn resolve_base_url(&self, requested: Option<&str>) -> Result<Url, String> {
        let raw = match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => url,
            None => self
                .base_url
                .as_deref()
                .ok_or_else(|| "no portalBaseUrl given and no default portal configured".to_string())?,
        };

        let url = Url::parse(raw).map_err(|e| format!("invalid portalBaseUrl '{raw}': {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("portalBaseUrl must be http(s), got '{}'", url.scheme()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| format!("portalBaseUrl '{raw}' has no host"))?;
        if !self.allowed_hosts.is_empty()
            && !self
                .allowed_hosts
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(host))
        {
            return Err(format!("portal host '{host}' is not allowed"));
        }

        Ok(url)
    }

    /// Joins a configured path onto a portal base URL.
    pub fn page_url(&self, base: &Url, path: &str) -> Result<Url, url::ParseError> {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PortalConfig = serde_json::from_str(
            r#"{ "baseUrl": "https://hac.example.org", "login": { "staticFields": { "Database": "42" } } }"#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://hac.example.org"));
        assert_eq!(config.login.static_fields.get("Database").map(String::as_str), Some("42"));
        assert_eq!(config.login.username_field, "LogOnDetails.UserName");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_resolve_base_url_rules() {
        let mut config = PortalConfig::default();
        assert!(config.resolve_base_url(None).is_err());
        assert!(config.resolve_base_url(Some("ftp://hac.example.org")).is_err());
        assert!(config.resolve_base_url(Some("not a url")).is_err());

        config.base_url = Some("https://hac.example.org".to_string());
        assert_eq!(
            config.resolve_base_url(None).unwrap().host_str(),
            Some("hac.example.org")
        );

        config.allowed_hosts = vec!["hac.example.org".to_string()];
        assert!(config.resolve_base_url(Some("https://evil.example.com")).is_err());
        assert!(config.resolve_base_url(Some("https://HAC.example.org/")).is_ok());
    }

    #[test]
    fn test_page_url_joins_absolute_path() {
        let config = PortalConfig::default();
        let base = Url::parse("https://hac.example.org/some/prefix").unwrap();
        let url = config.page_url(&base, &config.paths.assignments).unwrap();
        assert_eq!(
            url.as_str(),
            "https://hac.example.org/HomeAccess/Content/Student/Assignments.aspx"
        );
    }
}
