//! Realm configuration.
//!
//! Settings are layered: built-in defaults, then `realm.toml` (or an explicit file),
//! then `REALM_*` environment variables, then explicit overrides.
//!
//! ```toml
//! classpath = "/opt/realm/lib:/opt/realm/ext/libldap_realm.so"
//! implementation = "ldap-realm"
//! default_roles = "teller, auditor"
//! context_id = "branch-7"
//! loader_mode = "isolated"
//!
//! [logging]
//! level = "info"
//! ```

pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::{LogFormat, LoaderMode, LoggingConfig, RealmConfig, RotationStrategy};
