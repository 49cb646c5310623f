use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A title/body message pushed to one tenant group.
///
/// Producers may attach extra fields (job id, links, …); they travel
/// untouched in `extra` and reappear at the top level on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub titulo: String,
    pub texto: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationEvent {
    pub fn new(titulo: impl Into<String>, texto: impl Into<String>) -> Self {
        Self {
            titulo: titulo.into(),
            texto: texto.into(),
            extra: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Text shown in the in-app toast: title and body on separate lines.
    pub fn toast_text(&self) -> String {
        format!("{} \n {}", self.titulo, self.texto)
    }
}
