//! Realm Classpath Resolution
//!
//! Turns the realm classpath setting, an OS-delimited list of directories and files,
//! into the ordered set of `file:` locations an [`IsolatedLoader`](crate::loader::IsolatedLoader)
//! searches.
//!
//! # Examples
//!
//! ```rust
//! use realm_agent::classpath::ClasspathResolver;
//!
//! let resolver = ClasspathResolver::with_separator(":");
//! let spec = resolver.resolve("/opt/realm/libplugin.so").unwrap();
//! assert_eq!(spec.locations()[0].to_string(), "file:/opt/realm/libplugin.so");
//! ```

use crate::error::ConfigError;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info};
use url::Url;

/// Environment variable consulted when no classpath is configured explicitly
pub const REALM_CLASSPATH: &str = "REALM_CLASSPATH";

/// Native path-list delimiter of the build platform
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: &str = ";";
/// Native path-list delimiter of the build platform
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: &str = ":";

const FILE_PREFIX: &str = "file:/";
const UNIX_SEPARATOR: &str = ":";
const UNIX_SLASH: char = '/';
const WIN_SLASH: char = '\\';

/// A resolvable `file:` location, either a directory (trailing separator) or a single file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    url: Url,
}

impl Location {
    /// Wrap an already parsed URL
    pub fn from_url(url: Url) -> Self {
        Self { url }
    }

    /// Build a location for an absolute filesystem path
    pub fn from_path(path: &Path) -> Option<Self> {
        let url = if path.is_dir() {
            Url::from_directory_path(path).ok()?
        } else {
            Url::from_file_path(path).ok()?
        };
        Some(Self { url })
    }

    /// Whether the location names everything under a directory
    pub fn is_directory(&self) -> bool {
        self.url.path().ends_with('/')
    }

    /// Filesystem path of the location, if it maps to one on this platform
    pub fn to_path(&self) -> Option<PathBuf> {
        self.url.to_file_path().ok()
    }

    /// Look up `name` inside this location.
    ///
    /// Directory locations resolve `name` relative to the directory and never outside
    /// it; file locations only match their own file name.
    pub fn find_resource(&self, name: &str) -> Option<Location> {
        let path = self.to_path()?;
        if self.is_directory() {
            let relative = Path::new(name.trim_start_matches('/'));
            if !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
            {
                debug!(resource = name, location = %self, "Resource name leaves its location, ignored");
                return None;
            }
            let candidate = path.join(relative);
            if candidate.exists() {
                return Location::from_path(&candidate);
            }
            None
        } else if path.file_name().and_then(|n| n.to_str()) == Some(name) && path.exists() {
            Some(self.clone())
        } else {
            None
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `file:///opt/x` renders as `file:/opt/x`, the empty authority is dropped
        if self.url.scheme() == "file" && self.url.host().is_none() {
            write!(f, "file:{}", self.url.path())
        } else {
            write!(f, "{}", self.url)
        }
    }
}

/// Ordered, immutable set of locations resolved from one classpath value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClasspathSpec {
    raw: String,
    locations: Vec<Location>,
}

impl ClasspathSpec {
    /// Spec with no locations, used when a realm loads from the host only
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a spec from already resolved locations
    pub fn from_locations(locations: Vec<Location>) -> Self {
        let raw = locations
            .iter()
            .filter_map(|l| l.to_path())
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(PATH_LIST_SEPARATOR);
        Self { raw, locations }
    }

    /// The configuration value this spec was resolved from
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Location> {
        self.locations.iter()
    }
}

/// Resolves realm classpath values into [`ClasspathSpec`]s
#[derive(Debug, Clone)]
pub struct ClasspathResolver {
    separator: String,
}

impl ClasspathResolver {
    /// Resolver using the platform's native path-list delimiter
    pub fn new() -> Self {
        Self {
            separator: PATH_LIST_SEPARATOR.to_string(),
        }
    }

    /// Resolver using an explicit path-list delimiter
    pub fn with_separator(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Resolve a classpath value.
    ///
    /// Fails as a whole when the value is empty, when the delimiter is unknown, or when
    /// any entry cannot become a well-formed `file:` location. No partial classpath is
    /// ever returned.
    pub fn resolve(&self, classpath: &str) -> Result<ClasspathSpec, ConfigError> {
        if self.separator.is_empty() {
            error!("Realm classpath path separator could not be determined");
            return Err(ConfigError::Malformed(
                "path-list separator is empty".to_string(),
            ));
        }
        if classpath.trim().is_empty() {
            error!("Invalid realm classpath detected: value is empty");
            return Err(ConfigError::Missing("realm classpath is empty".to_string()));
        }

        // unix requires an extra slash after the file prefix
        let (file_prefix, slash) = if self.separator == UNIX_SEPARATOR {
            (format!("{}{}", FILE_PREFIX, UNIX_SLASH), UNIX_SLASH)
        } else {
            (FILE_PREFIX.to_string(), WIN_SLASH)
        };

        info!(classpath, "Resolving realm classpath");

        let mut locations = Vec::new();
        for (index, token) in classpath
            .split(self.separator.as_str())
            .filter(|t| !t.is_empty())
            .enumerate()
        {
            let resource = escape_url_delimiters(&normalize_directory(token, slash));
            let text = format!("{}{}", file_prefix, resource);
            let url = Url::parse(&text).map_err(|e| {
                error!(entry = token, error = %e, "Malformed realm classpath entry, check the realm classpath setting");
                ConfigError::Malformed(format!("{}: {}", text, e))
            })?;
            if url.fragment().is_some() || url.query().is_some() {
                error!(entry = token, "Realm classpath entry does not name a single path");
                return Err(ConfigError::Malformed(format!(
                    "{}: entry does not name a single path",
                    token
                )));
            }
            if url.host().is_some() {
                error!(entry = token, "Realm classpath entry is not an absolute path");
                return Err(ConfigError::Malformed(format!(
                    "{}: entry must be an absolute path",
                    token
                )));
            }

            let location = Location::from_url(url);
            info!(index, location = %location, "Realm classpath entry resolved");
            locations.push(location);
        }

        if locations.is_empty() {
            error!(classpath, "Realm classpath contains no entries");
            return Err(ConfigError::Missing(
                "realm classpath contains no entries".to_string(),
            ));
        }

        Ok(ClasspathSpec {
            raw: classpath.to_string(),
            locations,
        })
    }

    /// Resolve the classpath held by an environment variable
    pub fn resolve_env(&self, var: &str) -> Result<ClasspathSpec, ConfigError> {
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => self.resolve(&value),
            _ => {
                error!(var, "Invalid realm classpath detected: variable not set");
                Err(ConfigError::Missing(format!("{} is not set", var)))
            }
        }
    }
}

impl Default for ClasspathResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// A bare directory must resolve to everything under it, so it gets a trailing separator
fn normalize_directory(name: &str, slash: char) -> String {
    if Path::new(name).is_dir() && !name.ends_with(slash) {
        debug!(entry = name, "Separator appended to directory entry");
        format!("{}{}", name, slash)
    } else {
        name.to_string()
    }
}

/// Keep `%`, `#` and `?` as path characters instead of URL delimiters
fn escape_url_delimiters(resource: &str) -> String {
    let mut escaped = String::with_capacity(resource.len());
    for c in resource.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '#' => escaped.push_str("%23"),
            '?' => escaped.push_str("%3F"),
            _ => escaped.push(c),
        }
    }
    escaped
}
