//! Model classes, import actions and the model snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;

/// Gradle property carrying the comma-separated requested model names.
pub const MODELS_PROPERTY: &str = "modelHarnessModels";
/// Gradle property telling the export task to add default models.
pub const DEFAULTS_PROPERTY: &str = "modelHarnessDefaults";
/// Gradle property naming the JSON file the export task writes.
pub const OUTPUT_PROPERTY: &str = "modelHarnessOutput";
/// Task registered by the init script.
pub const EXPORT_TASK: &str = "modelHarnessExport";

/// Name of a model type a model builder can produce.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelClass(String);

impl ModelClass {
    pub const EXTERNAL_PROJECT: &'static str = "ExternalProject";
    pub const GRADLE_BUILD: &'static str = "GradleBuild";

    pub fn new(name: impl Into<String>) -> Self {
        ModelClass(name.into())
    }

    pub fn external_project() -> Self {
        Self::new(Self::EXTERNAL_PROJECT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModelClass {
    fn from(s: &str) -> Self {
        ModelClass::new(s)
    }
}

/// The set of model classes a case asks for.
pub type ModelSet = BTreeSet<ModelClass>;

/// Request submitted to the build tool: which models to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportAction {
    models: ModelSet,
    include_default_models: bool,
}

impl ImportAction {
    pub fn new(include_default_models: bool) -> Self {
        Self {
            models: ModelSet::new(),
            include_default_models,
        }
    }

    /// Add extra project model classes to build.
    pub fn add_models<I>(&mut self, models: I)
    where
        I: IntoIterator<Item = ModelClass>,
    {
        self.models.extend(models);
    }

    pub fn with_models<I>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = ModelClass>,
    {
        self.add_models(models);
        self
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn include_default_models(&self) -> bool {
        self.include_default_models
    }

    /// `-P` arguments encoding this action for the export task.
    pub fn to_properties(&self) -> Vec<String> {
        let names: Vec<&str> = self.models.iter().map(ModelClass::as_str).collect();
        vec![
            format!("-P{}={}", MODELS_PROPERTY, names.join(",")),
            format!("-P{}={}", DEFAULTS_PROPERTY, self.include_default_models),
        ]
    }
}

/// Snapshot of every model returned by one import action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllModels {
    /// Gradle version that produced the snapshot, as reported by Gradle
    #[serde(default)]
    pub gradle_version: Option<String>,
    /// Models keyed by class
    #[serde(default)]
    pub models: BTreeMap<ModelClass, serde_json::Value>,
}

impl AllModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, class: ModelClass, value: serde_json::Value) -> Self {
        self.models.insert(class, value);
        self
    }

    /// Raw model for `class`; JSON `null` counts as absent.
    pub fn get(&self, class: &ModelClass) -> Option<&serde_json::Value> {
        self.models.get(class).filter(|v| !v.is_null())
    }

    /// Model for `class` decoded into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, class: &ModelClass) -> HarnessResult<Option<T>> {
        match self.get(class) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Classes with a non-null model.
    pub fn classes(&self) -> ModelSet {
        self.models
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Requested classes that have no model in the snapshot.
    pub fn missing(&self, requested: &ModelSet) -> Vec<ModelClass> {
        requested
            .iter()
            .filter(|class| self.get(class).is_none())
            .cloned()
            .collect()
    }

    /// Classes in the snapshot that were not requested.
    pub fn unexpected(&self, requested: &ModelSet) -> Vec<ModelClass> {
        self.classes()
            .into_iter()
            .filter(|class| !requested.contains(class))
            .collect()
    }
}

/// Project structure reported by the `ExternalProject` builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProject {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub project_dir: String,
    pub build_dir: String,
    #[serde(default)]
    pub children: Vec<String>,
}
