//! Descriptions of registered services and their parameters.

use serde::{Deserialize, Serialize};

use strata_core::{Properties, Result, ServiceKind};

/// Value type of a service parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Integer,
    Float,
    String,
    Boolean,
    Colour,
    Time,
}

impl ParameterType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Colour => "colour",
            Self::Time => "time",
        }
    }
}

/// Descriptor for a single service parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    pub identifier: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl ParameterMetadata {
    pub fn new(identifier: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            identifier: identifier.into(),
            param_type,
            title: None,
            default: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// Descriptor for a registered service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub identifier: String,
    pub kind: ServiceKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub parameters: Vec<ParameterMetadata>,
}

impl ServiceMetadata {
    pub fn new(kind: ServiceKind, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            title: identifier.clone(),
            identifier,
            kind,
            description: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            parameters: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterMetadata) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter(&self, identifier: &str) -> Option<&ParameterMetadata> {
        self.parameters.iter().find(|p| p.identifier == identifier)
    }

    /// The metadata as a property store; parameters become a sequence.
    pub fn to_properties(&self) -> Result<Properties> {
        let props = Properties::new();
        props.set("identifier", &self.identifier)?;
        props.set("type", self.kind.name())?;
        props.set("title", &self.title)?;
        if !self.description.is_empty() {
            props.set("description", &self.description)?;
        }
        props.set("version", &self.version)?;

        let parameters = Properties::new();
        for (i, parameter) in self.parameters.iter().enumerate() {
            let entry = Properties::new();
            entry.set("identifier", &parameter.identifier)?;
            entry.set("type", parameter.param_type.name())?;
            if let Some(title) = &parameter.title {
                entry.set("title", title)?;
            }
            if let Some(default) = &parameter.default {
                entry.set("default", default)?;
            }
            if let Some(minimum) = parameter.minimum {
                entry.set_double("minimum", minimum)?;
            }
            if let Some(maximum) = parameter.maximum {
                entry.set_double("maximum", maximum)?;
            }
            parameters.set_properties(&i.to_string(), &entry)?;
        }
        props.set_properties("parameters", &parameters)?;
        Ok(props)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(self.to_properties()?.to_yaml())
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
