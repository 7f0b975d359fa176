use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `requested` for `capability`, falling back to the first
    /// capable model in registry order. The fallback reason says why.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        self.resolve(requested, capability, None)
    }

    /// Like `select`, but only models served by `provider` are eligible.
    pub fn select_from_provider(
        &self,
        requested: Option<&str>,
        capability: Capability,
        provider: &str,
    ) -> Result<ModelSelection, String> {
        self.resolve(requested, capability, Some(provider))
    }

    fn resolve(
        &self,
        requested: Option<&str>,
        capability: Capability,
        provider: Option<&str>,
    ) -> Result<ModelSelection, String> {
        let eligible =
            |model: &ModelSpec| provider.map_or(true, |provider| model.provider == provider);

        let fallback_reason = match requested {
            None => "No model specified; using default.".to_string(),
            Some(name) => match self.registry.ensure(name, capability) {
                Some(model) if eligible(&model) => {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                Some(_) => format!(
                    "Model '{name}' is not served by '{}'.",
                    provider.unwrap_or_default()
                ),
                None => {
                    format!("Requested model '{name}' unavailable for capability '{capability}'.")
                }
            },
        };

        let model = self
            .registry
            .by_capability(capability)
            .into_iter()
            .find(|model| eligible(model))
            .ok_or_else(|| match provider {
                Some(provider) => {
                    format!("No '{provider}' models available for capability '{capability}'.")
                }
                None => format!("No models available for capability '{capability}'."),
            })?;
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}
