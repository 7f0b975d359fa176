use std::fmt;

use indexmap::IndexMap;

pub const SDXL_VERSION: &str =
    "stability-ai/sdxl:39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Text,
    Vision,
    Image,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    /// Identifier sent over the wire; differs from `name` for pinned versions.
    pub remote_id: String,
    pub capabilities: Vec<Capability>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(default_models())
    }
}

impl ModelRegistry {
    /// Registry keyed by model name, in the order given.
    pub fn new(models: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            models: models
                .into_iter()
                .map(|model| (model.name.clone(), model))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports(capability))
            .cloned()
    }
}

fn default_models() -> Vec<ModelSpec> {
    use Capability::{Image, Text, Vision};

    let spec = |name: &str, provider: &str, remote_id: &str, capabilities: &[Capability]| {
        ModelSpec {
            name: name.to_string(),
            provider: provider.to_string(),
            remote_id: remote_id.to_string(),
            capabilities: capabilities.to_vec(),
        }
    };

    vec![
        spec("gemini-pro", "gemini", "gemini-pro", &[Text]),
        spec("gemini-pro-vision", "gemini", "gemini-pro-vision", &[Text, Vision]),
        spec("sdxl", "replicate", SDXL_VERSION, &[Image]),
        spec("dryrun-text-1", "dryrun", "dryrun-text-1", &[Text, Vision]),
        spec("dryrun-image-1", "dryrun", "dryrun-image-1", &[Image]),
    ]
}
