//! Checkpoint registry.
//!
//! Maps the opaque code printed on a checkpoint tag to the name shown to the
//! guard. Lookups never fail: unknown codes get a synthesized label that
//! carries the raw code.

use std::collections::BTreeMap;

/// Built-in checkpoint codes and their display names.
const BUILTIN_POINTS: &[(&str, &str)] = &[
    ("PONTO_01", "Portaria Principal"),
    ("PONTO_02", "Estacionamento Norte"),
    ("PONTO_03", "Depósito de Carga"),
    ("PONTO_04", "Escritório Administrativo"),
    ("PONTO_05", "Refeitório"),
    ("PONTO_SECURE_01", "Cofre Central"),
];

/// Immutable code → name mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointRegistry {
    points: BTreeMap<String, String>,
}

impl PointRegistry {
    /// The registry shipped with the application.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_points(
            BUILTIN_POINTS
                .iter()
                .map(|(code, name)| ((*code).to_string(), (*name).to_string())),
        )
    }

    /// Build a registry from arbitrary code/name pairs.
    ///
    /// Later pairs override earlier ones with the same code.
    #[must_use]
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            points: points.into_iter().collect(),
        }
    }

    /// The built-in registry with `overrides` layered on top.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut registry = Self::builtin();
        registry.points.extend(
            overrides
                .iter()
                .map(|(code, name)| (code.clone(), name.clone())),
        );
        registry
    }

    /// Resolve a scanned code to its display name.
    ///
    /// Unknown codes yield [`unknown_point_label`].
    #[must_use]
    pub fn resolve(&self, code: &str) -> String {
        self.get(code)
            .map_or_else(|| unknown_point_label(code), ToString::to_string)
    }

    /// Look up a code without the fallback label.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&str> {
        self.points.get(code).map(String::as_str)
    }

    /// Check whether a code is registered.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.points.contains_key(code)
    }

    /// Number of registered checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over `(code, name)` pairs, sorted by code.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.points
            .iter()
            .map(|(code, name)| (code.as_str(), name.as_str()))
    }
}

impl Default for PointRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Label used for codes missing from the registry.
#[must_use]
pub fn unknown_point_label(code: &str) -> String {
    format!("Ponto Desconhecido ({code})")
}
