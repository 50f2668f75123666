use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Copilot `/models` response. Fields the gateway does not read are kept in
/// `extra` so `/v1/models` can relay them unchanged.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<Model>,
    #[serde(default = "default_list_object")]
    pub object: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelCapabilities {
    #[serde(default)]
    pub family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub limits: ModelLimits,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_window_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_prompt_tokens: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_list_object() -> String {
    "list".to_string()
}

/// Immutable model list fetched at startup and shared by `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: ModelsResponse,
}

impl ModelCatalog {
    pub fn new(models: ModelsResponse) -> Self {
        Self { models }
    }

    pub fn find(&self, model_id: &str) -> Option<&Model> {
        self.models.data.iter().find(|model| model.id == model_id)
    }

    pub fn models(&self) -> &ModelsResponse {
        &self.models
    }

    pub fn model_count(&self) -> usize {
        self.models.data.len()
    }
}

#[cfg(test)]
pub(crate) fn test_catalog(ids: &[&str]) -> ModelCatalog {
    let data = ids
        .iter()
        .map(|id| Model {
            id: id.to_string(),
            name: id.to_string(),
            vendor: "test".to_string(),
            capabilities: ModelCapabilities {
                family: id.to_string(),
                tokenizer: Some("o200k_base".to_string()),
                limits: ModelLimits {
                    max_output_tokens: Some(4096),
                    ..Default::default()
                },
                extra: Map::new(),
            },
            extra: Map::new(),
        })
        .collect();

    ModelCatalog::new(ModelsResponse {
        data,
        object: default_list_object(),
        extra: Map::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::{ModelCatalog, ModelsResponse};
    use serde_json::json;

    #[test]
    fn decodes_copilot_models_and_keeps_unknown_fields() {
        let raw = json!({
            "object": "list",
            "data": [{
                "id": "claude-sonnet-4",
                "name": "Claude Sonnet 4",
                "vendor": "Anthropic",
                "version": "claude-sonnet-4",
                "preview": false,
                "capabilities": {
                    "family": "claude-sonnet-4",
                    "tokenizer": "o200k_base",
                    "type": "chat",
                    "limits": {"max_output_tokens": 16000, "max_prompt_tokens": 128000},
                    "supports": {"tool_calls": true}
                }
            }]
        });

        let models: ModelsResponse = serde_json::from_value(raw.clone()).expect("decode");
        let catalog = ModelCatalog::new(models);

        let model = catalog.find("claude-sonnet-4").expect("model present");
        assert_eq!(model.capabilities.limits.max_output_tokens, Some(16000));
        assert!(catalog.find("claude-sonnet").is_none());

        let encoded = serde_json::to_value(catalog.models()).expect("encode");
        assert_eq!(encoded, raw);
    }
}
