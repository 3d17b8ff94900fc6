//! Top-level resource kind selection.

use serde::Serialize;

use crate::config::InstanceConfig;

/// The two mutually exclusive top-level resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// A single running instance.
    Instance,
    /// A reusable instance template.
    Template,
}

/// Selects the top-level resource kind from `create_template`.
#[must_use]
pub const fn resolve_shape(config: &InstanceConfig) -> ShapeKind {
    if config.create_template {
        ShapeKind::Template
    } else {
        ShapeKind::Instance
    }
}

impl ShapeKind {
    /// Returns true for instance resolution.
    #[must_use]
    pub const fn is_instance(self) -> bool {
        matches!(self, Self::Instance)
    }

    /// Returns the lowercase name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Template => "template",
        }
    }
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
