//! Fixture files.
//!
//! A fixture file describes a whole interception setup in YAML: policy
//! settings, ignored URLs, and rules.

use crate::client::Body;
use crate::matcher::{Pattern, UriKey};
use crate::registry::Registration;
use crate::response::{BodySource, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main fixture configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FixtureConfig {
    /// Network policy
    #[serde(default)]
    pub settings: PolicySettings,

    /// URLs always forwarded to the real network
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Rule definitions, registered in order
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl FixtureConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, rule) in self.rules.iter().enumerate() {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("Rule {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// Network policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySettings {
    /// Forward unmatched requests to the real network
    #[serde(default = "default_true")]
    pub allow_net_connect: bool,

    /// Forward unmatched loopback requests even when the network is off
    #[serde(default = "default_true")]
    pub allow_local_connect: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            allow_net_connect: true,
            allow_local_connect: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single rule definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    /// Literal URL (exclusive with `pattern`)
    #[serde(default)]
    pub uri: Option<String>,

    /// URL pattern (exclusive with `uri`)
    #[serde(default)]
    pub pattern: Option<PatternDefinition>,

    /// HTTP method (absent = any)
    #[serde(default)]
    pub method: Option<String>,

    /// Status code or status sequence
    #[serde(default)]
    pub status: Option<StatusDefinition>,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Content-type override
    #[serde(default)]
    pub content_type: Option<String>,

    /// Response body
    #[serde(default)]
    pub body: Option<BodyDefinition>,

    /// Refuse the connection instead of responding
    #[serde(default)]
    pub exception: bool,
}

impl RuleDefinition {
    /// Validate the rule definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        match (&self.uri, &self.pattern) {
            (Some(_), Some(_)) => anyhow::bail!("Rule cannot have both uri and pattern"),
            (None, None) => anyhow::bail!("Rule needs a uri or a pattern"),
            (None, Some(pattern)) => pattern.validate()?,
            (Some(_), None) => {}
        }
        if let Some(status) = &self.status {
            status.validate()?;
        }
        Ok(())
    }

    /// Build the registration this rule describes.
    pub fn to_registration(&self) -> anyhow::Result<Registration> {
        let uri = match (&self.uri, &self.pattern) {
            (Some(uri), _) => UriKey::Literal(uri.clone()),
            (None, Some(pattern)) => UriKey::Pattern(pattern.compile()?),
            (None, None) => anyhow::bail!("Rule needs a uri or a pattern"),
        };

        let mut registration = Registration::new(uri);
        registration.method = self.method.clone();
        registration.headers = self.headers.clone();
        registration.content_type = self.content_type.clone();
        registration.exception = self.exception;
        if let Some(status) = &self.status {
            registration.status = status.to_status_code();
        }
        if let Some(body) = &self.body {
            registration.body = body.to_source()?;
        }
        Ok(registration)
    }
}

/// Pattern key configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternDefinition {
    /// Regex searched anywhere in the normalized URL
    Regex { pattern: String },
    /// Glob matched against the whole normalized URL
    Glob { pattern: String },
}

impl PatternDefinition {
    /// Validate the pattern.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.compile().map(|_| ())
    }

    pub fn compile(&self) -> anyhow::Result<Pattern> {
        match self {
            PatternDefinition::Regex { pattern } => {
                Pattern::regex(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))
            }
            PatternDefinition::Glob { pattern } => {
                Pattern::glob(pattern).map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))
            }
        }
    }
}

/// Status code configuration: a single code or a sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusDefinition {
    Fixed(u16),
    Sequence(Vec<u16>),
}

impl StatusDefinition {
    /// Validate every status code.
    pub fn validate(&self) -> anyhow::Result<()> {
        let codes = match self {
            StatusDefinition::Fixed(code) => std::slice::from_ref(code),
            StatusDefinition::Sequence(codes) => codes.as_slice(),
        };
        for code in codes {
            if !(100..=599).contains(code) {
                anyhow::bail!("Invalid status code: {}", code);
            }
        }
        Ok(())
    }

    pub fn to_status_code(&self) -> StatusCode {
        match self {
            StatusDefinition::Fixed(code) => StatusCode::Fixed(*code),
            StatusDefinition::Sequence(codes) => StatusCode::Sequence(codes.clone()),
        }
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyDefinition {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Text file, read on every call
    File { path: String },
    /// Binary file, read on every call
    BinaryFile { path: String },
    /// Handlebars template rendered against the request
    Template { content: String },
}

impl BodyDefinition {
    /// Get the body source this definition describes.
    pub fn to_source(&self) -> anyhow::Result<BodySource> {
        Ok(match self {
            BodyDefinition::Text { content } => BodySource::Static(Body::Text(content.clone())),
            BodyDefinition::Json { content } => BodySource::Static(Body::Json(content.clone())),
            BodyDefinition::Base64 { content } => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?;
                BodySource::Static(Body::Binary(bytes))
            }
            BodyDefinition::File { path } => BodySource::File(path.into()),
            BodyDefinition::BinaryFile { path } => BodySource::BinaryFile(path.into()),
            BodyDefinition::Template { content } => BodySource::Template(content.clone()),
        })
    }
}
