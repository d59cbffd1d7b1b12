use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::forms::{BUILTIN_FORMS, FormSchema, SchemaForm, builtin_schema};
use crate::loader;
use crate::types::{ComponentDefinition, ComponentKey};

pub const DEFAULT_SLOW_LOAD_DELAY: Duration = Duration::from_millis(2000);

pub type LoadFuture = Pin<Box<dyn Future<Output = Result<ComponentDefinition>> + Send>>;

/// Called once per resolve; implementations decide whether to cache.
pub trait ComponentFactory: Send + Sync {
    fn load(&self) -> LoadFuture;
}

impl<F, Fut> ComponentFactory for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentDefinition>> + Send + 'static,
{
    fn load(&self) -> LoadFuture {
        Box::pin(self())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Component '{0}' not found")]
    KeyNotFound(String),
    #[error("Component '{key}' failed to load")]
    LoadFailure {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Loading component '{0}' was cancelled")]
    Cancelled(String),
}

#[derive(Debug, Clone)]
pub struct FormFactory {
    name: String,
    schema: Arc<FormSchema>,
}

impl FormFactory {
    pub fn new(name: impl Into<String>, schema: FormSchema) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
        }
    }
}

impl ComponentFactory for FormFactory {
    fn load(&self) -> LoadFuture {
        let name = self.name.clone();
        let schema = self.schema.clone();
        Box::pin(async move {
            Ok(ComponentDefinition::new(
                name,
                SchemaForm::new(FormSchema::clone(&schema)),
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchemaFileFactory {
    name: String,
    path: PathBuf,
}

impl SchemaFileFactory {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl ComponentFactory for SchemaFileFactory {
    fn load(&self) -> LoadFuture {
        let name = self.name.clone();
        let path = self.path.clone();
        Box::pin(async move {
            let schema = FormSchema::from_json_file(&path)?;
            Ok(ComponentDefinition::new(name, SchemaForm::new(schema)))
        })
    }
}

/// Wraps a factory so it is only invoked once `delay` has passed.
pub struct Delayed<F> {
    inner: Arc<F>,
    delay: Duration,
}

impl<F: ComponentFactory + 'static> Delayed<F> {
    pub fn new(inner: F, delay: Duration) -> Self {
        Self {
            inner: Arc::new(inner),
            delay,
        }
    }
}

impl<F: ComponentFactory + 'static> ComponentFactory for Delayed<F> {
    fn load(&self) -> LoadFuture {
        let delay = self.delay;
        let inner = self.inner.clone();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            inner.load().await
        })
    }
}

#[derive(Clone)]
pub struct ComponentRegistry {
    factories: Arc<HashMap<ComponentKey, Arc<dyn ComponentFactory>>>,
}

impl ComponentRegistry {
    fn new(factories: HashMap<ComponentKey, Arc<dyn ComponentFactory>>) -> Self {
        Self {
            factories: Arc::new(factories),
        }
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new())
    }

    pub fn keys(&self) -> Vec<&ComponentKey> {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub async fn resolve(&self, key: &str) -> Result<ComponentDefinition, ResolveError> {
        let factory = self.factory(key)?;
        Self::load(key, factory).await
    }

    pub async fn resolve_cancellable(
        &self,
        key: &str,
        token: &CancellationToken,
    ) -> Result<ComponentDefinition, ResolveError> {
        let factory = self.factory(key)?;
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(key, "Component load cancelled");
                Err(ResolveError::Cancelled(key.to_string()))
            }
            result = Self::load(key, factory) => result,
        }
    }

    fn factory(&self, key: &str) -> Result<&Arc<dyn ComponentFactory>, ResolveError> {
        self.factories.get(key).ok_or_else(|| {
            tracing::warn!(key, "No component registered under key");
            ResolveError::KeyNotFound(key.to_string())
        })
    }

    async fn load(
        key: &str,
        factory: &Arc<dyn ComponentFactory>,
    ) -> Result<ComponentDefinition, ResolveError> {
        let started = Instant::now();
        tracing::debug!(key, "Resolving component");
        match factory.load().await {
            Ok(definition) => {
                tracing::debug!(
                    key,
                    component = definition.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Resolved component"
                );
                Ok(definition)
            }
            Err(source) => {
                tracing::warn!(key, error = %source, "Component failed to load");
                Err(ResolveError::LoadFailure {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Builder for configuring and creating a [`ComponentRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<(String, Arc<dyn ComponentFactory>)>,
    definition_files: Vec<PathBuf>,
}

impl RegistryBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(
        mut self,
        key: impl Into<String>,
        factory: impl ComponentFactory + 'static,
    ) -> Self {
        self.entries.push((key.into(), Arc::new(factory)));
        self
    }

    pub fn with_form(self, key: impl Into<String>, schema: FormSchema) -> Self {
        let key = key.into();
        let factory = FormFactory::new(key.clone(), schema);
        self.with_factory(key, factory)
    }

    pub fn with_delayed_form(
        self,
        key: impl Into<String>,
        schema: FormSchema,
        delay: Duration,
    ) -> Self {
        let key = key.into();
        let factory = Delayed::new(FormFactory::new(key.clone(), schema), delay);
        self.with_factory(key, factory)
    }

    /// Register every built-in form. `FormC` is slow to load.
    pub fn with_builtin_forms(mut self) -> Self {
        for name in BUILTIN_FORMS {
            let Some(schema) = builtin_schema(name) else {
                continue;
            };
            self = if name == "FormC" {
                self.with_delayed_form(name, schema, DEFAULT_SLOW_LOAD_DELAY)
            } else {
                self.with_form(name, schema)
            };
        }
        self
    }

    pub fn load_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.definition_files.push(path.into());
        self
    }

    pub fn build(self) -> Result<ComponentRegistry> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (key, factory) in self.entries {
            entries.push((ComponentKey::new(key)?, factory));
        }
        for definition in loader::load_definitions(&self.definition_files)? {
            let key = definition.key.clone();
            entries.push((key, definition.into_factory()?));
        }

        let mut factories = HashMap::with_capacity(entries.len());
        for (key, factory) in entries {
            if factories.contains_key(&key) {
                return Err(anyhow::anyhow!("Duplicate component key: '{key}'"));
            }
            factories.insert(key, factory);
        }

        tracing::debug!(count = factories.len(), "Built component registry");
        Ok(ComponentRegistry::new(factories))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_keys() {
        let registry = ComponentRegistry::builder()
            .with_builtin_forms()
            .build()
            .unwrap();
        let keys: Vec<_> = registry.keys().iter().map(|k| k.as_str()).collect();
        assert_eq!(keys, ["FormA", "FormB", "FormC", "FormOne", "FormTwo"]);
        assert!(registry.contains("FormC"));
        assert!(!registry.contains("FormX"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let schema = builtin_schema("FormA").unwrap();
        let result = ComponentRegistry::builder()
            .with_builtin_forms()
            .with_form("FormA", schema)
            .build();
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "Duplicate component key: 'FormA'");
    }

    #[test]
    fn test_invalid_key_rejected() {
        let schema = builtin_schema("FormA").unwrap();
        let result = ComponentRegistry::builder().with_form("Form A", schema).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ComponentRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_key_not_found() {
        let registry = ComponentRegistry::empty();
        let err = registry.resolve("FormX").await.unwrap_err();
        assert!(matches!(err, ResolveError::KeyNotFound(ref key) if key == "FormX"));
        assert_eq!(err.to_string(), "Component 'FormX' not found");
    }
}
