//! Model routing table.
//!
//! Maps a requested model name to a loaded [`Generator`]. The set of entries
//! is fixed when the scheduler starts: a primary slot plus optional secondary
//! and tertiary slots. Exactly one entry is the default, and requests that do
//! not name a model are routed to it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{BackendSpec, ModelSlot};
use crate::error::{DaemonError, Result};

use super::backend::Generator;
use super::command::CommandGenerator;
use super::preview::PreviewGenerator;

/// One selectable model instance.
#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub name: String,
    pub is_default: bool,
    pub loaded: Arc<dyn Generator>,
}

impl ModelEntry {
    pub fn new(name: impl Into<String>, is_default: bool, loaded: Arc<dyn Generator>) -> Self {
        Self {
            name: name.into(),
            is_default,
            loaded,
        }
    }
}

/// Public description of a registered model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub is_default: bool,
}

/// Immutable name -> model table.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    entries: Vec<ModelEntry>,
}

impl ModelRegistry {
    /// Builds a registry from explicit entries.
    ///
    /// Fails when there are no entries, when names repeat or are blank, or
    /// when the number of default entries is not exactly one.
    pub fn new(entries: Vec<ModelEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(DaemonError::invalid_config("at least one model is required"));
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.name.trim().is_empty() {
                return Err(DaemonError::invalid_config("model names cannot be blank"));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(DaemonError::invalid_config(format!(
                    "duplicate model name: {}",
                    entry.name
                )));
            }
        }

        let defaults = entries.iter().filter(|e| e.is_default).count();
        if defaults != 1 {
            return Err(DaemonError::invalid_config(format!(
                "exactly one default model is required, found {}",
                defaults
            )));
        }

        Ok(Self { entries })
    }

    /// Builds a registry from the primary slot and optional extra slots.
    ///
    /// The primary slot is the default.
    pub fn from_slots(
        primary: (String, Arc<dyn Generator>),
        extra: impl IntoIterator<Item = (String, Arc<dyn Generator>)>,
    ) -> Result<Self> {
        let mut entries = vec![ModelEntry::new(primary.0, true, primary.1)];
        entries.extend(
            extra
                .into_iter()
                .map(|(name, loaded)| ModelEntry::new(name, false, loaded)),
        );
        Self::new(entries)
    }

    /// Builds a registry from configured slots. The first slot is the
    /// default; preview slots render into `output_dir`.
    pub fn from_model_slots(slots: &[ModelSlot], output_dir: &Path) -> Result<Self> {
        let entries = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let loaded = build_generator(slot, output_dir)?;
                Ok(ModelEntry::new(slot.name.clone(), i == 0, loaded))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    /// Resolves a requested model name.
    ///
    /// `None` or a blank name resolves to the default entry. Names are matched
    /// exactly; there is no fallback for unknown names.
    pub fn resolve(&self, name: Option<&str>) -> Result<&ModelEntry> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(self.default_entry()),
            Some(name) => self
                .entries
                .iter()
                .find(|e| e.name == name)
                .ok_or_else(|| DaemonError::model_not_found(name, &self.names())),
        }
    }

    /// Returns the default entry.
    pub fn default_entry(&self) -> &ModelEntry {
        // `new` guarantees exactly one default.
        self.entries
            .iter()
            .find(|e| e.is_default)
            .unwrap_or(&self.entries[0])
    }

    /// Lists registered models in slot order.
    pub fn list(&self) -> Vec<ModelInfo> {
        self.entries
            .iter()
            .map(|e| ModelInfo {
                name: e.name.clone(),
                is_default: e.is_default,
            })
            .collect()
    }

    /// Registered model names in slot order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_generator(slot: &ModelSlot, output_dir: &Path) -> Result<Arc<dyn Generator>> {
    match &slot.backend {
        BackendSpec::Preview => Ok(Arc::new(PreviewGenerator::new(output_dir))),
        BackendSpec::Command { command_line } => CommandGenerator::from_command_line(command_line)
            .map(|g| Arc::new(g) as Arc<dyn Generator>)
            .ok_or_else(|| {
                DaemonError::invalid_config(format!("model '{}' has no command", slot.name))
            }),
    }
}

/// Derives a model name from a checkpoint or config path.
///
/// `"checkpoints/acestep-v15-turbo/"` becomes `"acestep-v15-turbo"`.
pub fn model_name_from_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches(['/', '\\']);
    Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::GenerationError;
    use crate::types::{GenerationOutput, GenerationParams};

    #[derive(Debug)]
    struct Named(&'static str);

    impl Generator for Named {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn generate(
            &self,
            _params: &GenerationParams,
        ) -> std::result::Result<GenerationOutput, GenerationError> {
            Ok(GenerationOutput {
                model: Some(self.0.to_string()),
                ..Default::default()
            })
        }
    }

    fn slot(name: &'static str) -> (String, Arc<dyn Generator>) {
        (name.to_string(), Arc::new(Named(name)))
    }

    fn three_slots() -> ModelRegistry {
        ModelRegistry::from_slots(slot("turbo"), [slot("base"), slot("sft")]).unwrap()
    }

    #[test]
    fn empty_name_resolves_default() {
        let registry = three_slots();
        assert_eq!(registry.resolve(None).unwrap().name, "turbo");
        assert_eq!(registry.resolve(Some("")).unwrap().name, "turbo");
        assert_eq!(registry.resolve(Some("  ")).unwrap().name, "turbo");
    }

    #[test]
    fn explicit_name_resolves_slot() {
        let registry = three_slots();
        let entry = registry.resolve(Some("sft")).unwrap();
        assert_eq!(entry.name, "sft");
        assert!(!entry.is_default);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = three_slots();
        let err = registry.resolve(Some("xl")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ModelNotFound);
        assert!(err.message.contains("turbo, base, sft"));
    }

    #[test]
    fn list_marks_single_default() {
        let list = three_slots().list();
        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().filter(|m| m.is_default).count(), 1);
        assert_eq!(list[0].name, "turbo");
        assert!(list[0].is_default);
    }

    #[test]
    fn rejects_empty_registry() {
        assert!(ModelRegistry::new(Vec::new()).is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = ModelRegistry::from_slots(slot("turbo"), [slot("turbo")]).unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn rejects_wrong_default_count() {
        let none = vec![ModelEntry::new("a", false, Arc::new(Named("a")))];
        assert!(ModelRegistry::new(none).is_err());

        let two = vec![
            ModelEntry::new("a", true, Arc::new(Named("a"))),
            ModelEntry::new("b", true, Arc::new(Named("b"))),
        ];
        assert!(ModelRegistry::new(two).is_err());
    }

    #[test]
    fn default_not_inferred_from_order() {
        let entries = vec![
            ModelEntry::new("first", false, Arc::new(Named("first"))),
            ModelEntry::new("second", true, Arc::new(Named("second"))),
        ];
        let registry = ModelRegistry::new(entries).unwrap();
        assert_eq!(registry.resolve(None).unwrap().name, "second");
    }

    #[test]
    fn builds_from_configured_slots() {
        let slots: Vec<ModelSlot> = ["turbo", "base=python render.py"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let registry = ModelRegistry::from_model_slots(&slots, Path::new("/tmp")).unwrap();
        assert_eq!(registry.names(), ["turbo", "base"]);
        assert_eq!(registry.default_entry().name, "turbo");
        assert_eq!(registry.resolve(None).unwrap().loaded.kind(), "preview");
        assert_eq!(registry.resolve(Some("base")).unwrap().loaded.kind(), "command");
    }

    #[test]
    fn rejects_blank_command() {
        let slots = vec![ModelSlot {
            name: "turbo".to_string(),
            backend: BackendSpec::Command {
                command_line: "   ".to_string(),
            },
        }];
        let err = ModelRegistry::from_model_slots(&slots, Path::new("/tmp")).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidConfig);
    }

    #[test]
    fn model_name_from_paths() {
        assert_eq!(model_name_from_path("acestep-v15-turbo"), "acestep-v15-turbo");
        assert_eq!(
            model_name_from_path("checkpoints/acestep-v15-base/"),
            "acestep-v15-base"
        );
    }
}
