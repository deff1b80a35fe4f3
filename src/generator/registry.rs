//! Name → generator lookup

use super::{GenerationRunner, Generator};
use crate::config::GeneratorConfig;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Builds a generator from its configuration
pub type GeneratorFactory = fn(&GeneratorConfig) -> Result<Box<dyn Generator>>;

/// Maps model names to generator constructors
#[derive(Default)]
pub struct ModelRegistry {
    factories: BTreeMap<String, GeneratorFactory>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the generators shipped in this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::models::register_builtin(&mut registry);
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, factory: GeneratorFactory) {
        let name = name.into();
        debug!("Registering generator '{}'", name);
        if self.factories.insert(name.clone(), factory).is_some() {
            warn!("Generator '{}' was already registered; replaced", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the generator named by `config.model`
    pub fn create(&self, config: &GeneratorConfig) -> Result<Box<dyn Generator>> {
        let factory = self
            .factories
            .get(&config.model)
            .ok_or_else(|| Error::UnknownModel(config.model.clone()))?;
        factory(config)
    }

    /// Construct the generator and wrap it in a runner
    pub fn runner(&self, config: GeneratorConfig) -> Result<GenerationRunner> {
        let generator = self.create(&config)?;
        Ok(GenerationRunner::new(config, generator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ResolvedSettings;
    use crate::generator::Artifact;

    struct Echo(String);

    impl Generator for Echo {
        fn create_pipeline(&mut self, _settings: &ResolvedSettings) -> Result<()> {
            Ok(())
        }

        fn run_pipeline_impl(&mut self) -> Result<Artifact> {
            Ok(Artifact::Text(self.0.clone()))
        }
    }

    fn echo(config: &GeneratorConfig) -> Result<Box<dyn Generator>> {
        let text = config.param::<String>("text")?.unwrap_or_default();
        Ok(Box::new(Echo(text)))
    }

    #[test]
    fn test_lookup_by_name() {
        let mut registry = ModelRegistry::new();
        registry.register("echo", echo);
        assert!(registry.contains("echo"));

        let config = GeneratorConfig::new("echo", "unused", "/tmp").with_param("text", "hi");
        let mut generator = registry.create(&config).unwrap();
        match generator.run_pipeline_impl().unwrap() {
            Artifact::Text(text) => assert_eq!(text, "hi"),
            other => panic!("unexpected artifact {:?}", other),
        }
    }

    #[test]
    fn test_unknown_model() {
        let registry = ModelRegistry::new();
        let config = GeneratorConfig::new("missing", "unused", "/tmp");
        assert!(matches!(
            registry.create(&config),
            Err(Error::UnknownModel(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_builtin_names() {
        let registry = ModelRegistry::with_builtin();
        assert!(registry.contains("llama"));
        let names: Vec<&str> = registry.names().collect();
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }
}
