//! Classpath and isolated loader integration tests

use realm_agent::classpath::{ClasspathResolver, ClasspathSpec, Location};
use realm_agent::config::{LoaderMode, RealmConfig};
use realm_agent::engine::InMemoryEngine;
use realm_agent::error::{BoxError, LoadError};
use realm_agent::loader::{HostContext, IsolatedLoader, LoadingContext, LocationScanner};
use realm_agent::plugins::{
    PluginContext, PluginType, PolicyRealm, RealmPlugin, TypeOrigin, DEFAULT_PLUGIN_TYPE,
};
use realm_agent::RealmBuilder;
use std::sync::Arc;

/// Stands in for a plugin build bundled on the classpath
fn bundled_realm(context: &PluginContext) -> Result<Arc<dyn RealmPlugin>, BoxError> {
    PolicyRealm::construct(context)
}

/// Every location declares its own `policy-realm`
fn bundling_scanner() -> Arc<dyn LocationScanner> {
    Arc::new(|location: &Location| -> Result<Vec<PluginType>, LoadError> {
        Ok(vec![
            PluginType::new(DEFAULT_PLUGIN_TYPE, bundled_realm).declared_at(location, None)
        ])
    })
}

fn plugin_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("lib")).unwrap();
    dir
}

#[cfg(unix)]
#[test]
fn test_directory_resolves_with_trailing_separator() {
    let dir = plugin_dir();
    let lib = dir.path().join("lib");

    let spec = ClasspathResolver::with_separator(":")
        .resolve(lib.to_str().unwrap())
        .unwrap();

    assert_eq!(spec.len(), 1);
    assert_eq!(spec.locations()[0].to_string(), format!("file:{}/", lib.display()));
}

#[test]
fn test_isolated_realm_prefers_bundled_plugin() {
    let dir = plugin_dir();
    let config = RealmConfig {
        classpath: Some(dir.path().join("lib").display().to_string()),
        loader_mode: LoaderMode::Isolated,
        ..Default::default()
    };

    let realm = RealmBuilder::new(config)
        .engine(Arc::new(InMemoryEngine::new()))
        .parent(Arc::new(HostContext::with_builtins()))
        .scanner(bundling_scanner())
        .build()
        .unwrap();

    assert_eq!(realm.type_name(), DEFAULT_PLUGIN_TYPE);
    assert!(matches!(
        realm.plugin().plugin_type().origin(),
        TypeOrigin::Location(_)
    ));

    std::fs::write(dir.path().join("lib").join("realm.properties"), b"x=1").unwrap();
    let found = realm.plugin().loader().load_resource("realm.properties").unwrap();
    assert_eq!(found.to_path().unwrap(), dir.path().join("lib").join("realm.properties"));
}

#[test]
fn test_delegating_realm_prefers_host_plugin() {
    let dir = plugin_dir();
    let config = RealmConfig {
        classpath: Some(dir.path().join("lib").display().to_string()),
        loader_mode: LoaderMode::Delegating,
        ..Default::default()
    };

    let realm = RealmBuilder::new(config)
        .engine(Arc::new(InMemoryEngine::new()))
        .parent(Arc::new(HostContext::with_builtins()))
        .scanner(bundling_scanner())
        .build()
        .unwrap();

    assert_eq!(realm.plugin().plugin_type().origin(), &TypeOrigin::Host);
}

#[test]
fn test_loader_falls_back_to_parent_for_absent_types() {
    let dir = plugin_dir();
    let spec = ClasspathSpec::from_locations(vec![Location::from_path(&dir.path().join("lib")).unwrap()]);

    let host = HostContext::new();
    host.register(PluginType::new("audit-realm", bundled_realm));

    let loader = IsolatedLoader::new(spec, Some(Arc::new(host))).with_scanner(bundling_scanner());

    assert!(matches!(
        loader.load_type(DEFAULT_PLUGIN_TYPE).unwrap().origin(),
        TypeOrigin::Location(_)
    ));
    assert_eq!(loader.load_type("audit-realm").unwrap().origin(), &TypeOrigin::Host);
    assert!(matches!(
        loader.load_type("ldap-realm"),
        Err(LoadError::NotFound(_))
    ));
}

#[test]
fn test_classpath_without_libraries_falls_back_to_global_context() {
    let dir = plugin_dir();
    let config = RealmConfig {
        classpath: Some(dir.path().join("lib").display().to_string()),
        ..Default::default()
    };

    let realm = RealmBuilder::new(config)
        .engine(Arc::new(InMemoryEngine::new()))
        .build()
        .unwrap();

    assert_eq!(realm.type_name(), DEFAULT_PLUGIN_TYPE);
    assert_eq!(realm.plugin().plugin_type().origin(), &TypeOrigin::Host);
}

#[test]
fn test_resource_lookup_stays_inside_classpath() {
    let dir = plugin_dir();
    let lib = dir.path().join("lib");
    std::fs::write(dir.path().join("outside.properties"), b"x=1").unwrap();
    std::fs::write(lib.join("realm.properties"), b"x=2").unwrap();

    let spec = ClasspathSpec::from_locations(vec![Location::from_path(&lib).unwrap()]);
    let loader = IsolatedLoader::new(spec, Some(Arc::new(HostContext::new())));

    assert!(loader.load_resource("../outside.properties").is_none());
    assert!(loader.load_resource("realm.properties").is_some());
}
