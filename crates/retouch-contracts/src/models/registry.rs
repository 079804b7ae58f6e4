use indexmap::IndexMap;

pub const EDIT_CAPABILITY: &str = "image_edit";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capabilities: capabilities
                .iter()
                .map(|item| (*item).to_string())
                .collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// The model an edit runs on, plus why it is not the one asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub fallback_reason: Option<String>,
}

/// Known models in preference order; the first model with a capability is its default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports(capability))
            .cloned()
    }

    /// Resolves the requested name to an edit-capable model. Blank, unknown and non-edit
    /// names fall back to the first edit model and record why.
    pub fn select_edit_model(&self, requested: Option<&str>) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        if let Some(model) = requested.and_then(|name| self.ensure(name, EDIT_CAPABILITY)) {
            return Ok(ModelSelection {
                model,
                fallback_reason: None,
            });
        }
        let Some(default) = self.by_capability(EDIT_CAPABILITY).into_iter().next() else {
            return Err("No image edit model is configured.".to_string());
        };
        let fallback_reason = match requested {
            Some(name) => format!("Model '{name}' cannot edit images; using {}.", default.name),
            None => format!("No model requested; using {}.", default.name),
        };
        Ok(ModelSelection {
            model: default,
            fallback_reason: Some(fallback_reason),
        })
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    [
        ModelSpec::new(DEFAULT_EDIT_MODEL, "gemini", &[EDIT_CAPABILITY]),
        ModelSpec::new("gemini-3-pro-image-preview", "gemini", &[EDIT_CAPABILITY]),
        ModelSpec::new("dryrun-edit-1", "dryrun", &[EDIT_CAPABILITY]),
    ]
    .into_iter()
    .map(|spec| (spec.name.clone(), spec))
    .collect()
}
