//! Cookie persistence for citation database sessions.
//!
//! Session cookies exported from a logged-in browser are stored as JSON and
//! replayed into every fresh extractor session, so institutional access and
//! consent state survive a session restart between passes.

use crate::error::{Result, WosError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default cookie file path: `~/.wos_cookies.json`
fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".wos_cookies.json"))
        .ok_or_else(|| WosError::Config("Cannot determine home directory".to_string()))
}

/// Cookie entry in the browser export format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub expires: Option<f64>,
}

impl Cookie {
    /// True if the cookie applies to `host` (exact or parent-domain match).
    pub fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
    }
}

/// Cookie manager for loading and saving cookies
pub struct CookieManager {
    path: PathBuf,
}

impl CookieManager {
    /// Create a new CookieManager with default path
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    /// Create a new CookieManager with custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Use `path` when given, else the default location
    pub fn from_path_or_default(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => Self::with_path(path),
            None => Self::default(),
        }
    }

    /// Get the cookie file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load cookies from file
    ///
    /// Returns empty vec if file doesn't exist or is invalid
    pub fn load(&self) -> Vec<Cookie> {
        if !self.path.exists() {
            debug!("Cookie file not found: {:?}", self.path);
            return Vec::new();
        }

        match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str::<Vec<Cookie>>(&content) {
                Ok(cookies) => {
                    info!("Loaded {} cookies from {:?}", cookies.len(), self.path);
                    cookies
                }
                Err(e) => {
                    warn!("Failed to parse cookies: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Failed to read cookie file: {}", e);
                Vec::new()
            }
        }
    }

    /// Build a `Cookie` header value for requests to `host`.
    pub fn header_for_host(&self, host: &str) -> String {
        build_cookie_header(&self.load(), host)
    }

    /// Save cookies to file
    pub fn save(&self, cookies: &[Cookie]) -> Result<()> {
        let content = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&self.path, content)?;
        info!("Saved {} cookies to {:?}", cookies.len(), self.path);
        Ok(())
    }

    /// Parse a JSON cookie array and save it. Returns the number saved.
    pub fn import_json(&self, json: &str) -> Result<usize> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)?;
        self.save(&cookies)?;
        Ok(cookies.len())
    }

    /// Clear stored cookies
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!("Cleared cookies at {:?}", self.path);
        }
        Ok(())
    }
}

impl Default for CookieManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            path: PathBuf::from(".wos_cookies.json"),
        })
    }
}

/// Build cookie header string from the cookies that apply to `host`
pub fn build_cookie_header(cookies: &[Cookie], host: &str) -> String {
    cookies
        .iter()
        .filter(|c| c.matches_host(host))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn cookie(name: &str, domain: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: "value".to_string(),
            domain: domain.to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: false,
            expires: None,
        }
    }

    #[test]
    fn test_load_empty() {
        let manager = CookieManager::with_path(PathBuf::from("/nonexistent/path"));
        assert!(manager.load().is_empty());
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let manager = CookieManager::with_path(temp.path().to_path_buf());

        manager.save(&[cookie("SID", ".clarivate.cn")])?;
        let loaded = manager.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "SID");
        Ok(())
    }

    #[test]
    fn test_import_json() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let manager = CookieManager::with_path(temp.path().to_path_buf());
        let count = manager.import_json(
            r#"[{"name":"SID","value":"abc","domain":".clarivate.cn"}]"#,
        )?;
        assert_eq!(count, 1);
        assert_eq!(
            manager.header_for_host("webofscience.clarivate.cn"),
            "SID=abc"
        );
        assert!(manager.import_json("not json").is_err());
        Ok(())
    }

    #[test]
    fn test_custom_path_shared_between_import_and_session() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("cookies.json");

        let importer = CookieManager::from_path_or_default(Some(path.clone()));
        importer.import_json(r#"[{"name":"SID","value":"abc","domain":".clarivate.cn"}]"#)?;

        let reader = CookieManager::from_path_or_default(Some(path.clone()));
        assert_eq!(reader.path(), path.as_path());
        assert_eq!(reader.header_for_host("webofscience.clarivate.cn"), "SID=abc");
        assert_ne!(CookieManager::from_path_or_default(None).path(), path.as_path());
        Ok(())
    }

    #[test]
    fn test_cookie_header_filters_host() {
        let cookies = vec![
            cookie("SID", ".clarivate.cn"),
            cookie("NID", ".google.com"),
            cookie("EXACT", "webofscience.clarivate.cn"),
        ];
        assert_eq!(
            build_cookie_header(&cookies, "webofscience.clarivate.cn"),
            "SID=value; EXACT=value"
        );
        assert!(!cookie("X", "clarivate.cn").matches_host("evilclarivate.cn"));
    }
}
