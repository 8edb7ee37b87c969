// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Path and input guard.
//!
//! Three enforcement duties sit here, all of which must run before anything
//! touches a subprocess or a persisted file:
//!
//! - template interpolation of commands and paths from the inputs mapping,
//!   where an unresolved placeholder is a recoverable error, never a panic;
//! - containment of working directories inside the configured base path;
//! - redaction of secret-bearing input values before persistence.

use handlebars::Handlebars;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Input-name fragments that mark a value as sensitive.
pub const SENSITIVE_TOKENS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "api-key",
    "private_key",
    "privatekey",
    "auth",
    "credential",
    "credentials",
    "access_key",
    "secret_key",
    "bearer",
    "jwt",
    "session",
];

/// Replacement literal for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Template renderer over the inputs mapping.
///
/// Strict mode: a placeholder without a matching input is an error, which
/// the runner surfaces as a `MissingInput` step failure.
pub struct Interpolator {
    renderer: Handlebars<'static>,
}

impl Interpolator {
    pub fn new() -> Self {
        let mut renderer = Handlebars::new();
        renderer.set_strict_mode(true);
        // Commands are not HTML.
        renderer.register_escape_fn(handlebars::no_escape);
        Self { renderer }
    }

    /// Render a template against the inputs mapping.
    pub fn render(&self, template: &str, inputs: &Map<String, Value>) -> Result<String> {
        self.renderer
            .render_template(template, &Value::Object(inputs.clone()))
            .map_err(|e| EngineError::MissingInput(e.to_string()))
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a candidate path and require it to stay inside `base`.
///
/// The candidate is joined onto `base` when relative, canonicalized, and
/// compared against the canonical base. Escapes fail with `PathEscape`
/// before any subprocess is spawned; a path that does not exist fails with
/// the underlying IO error.
pub fn resolve_contained(base: &Path, candidate: &str) -> Result<PathBuf> {
    let joined = {
        let candidate = Path::new(candidate);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base.join(candidate)
        }
    };

    let canonical_base = base.canonicalize()?;
    let canonical = joined.canonicalize()?;

    if !canonical.starts_with(&canonical_base) {
        return Err(EngineError::PathEscape {
            path: canonical,
            base: canonical_base,
        });
    }

    Ok(canonical)
}

fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SENSITIVE_TOKENS.iter().any(|token| lowered.contains(token))
}

/// Return a copy of the inputs mapping with sensitive values replaced by
/// the `[REDACTED]` literal. Nested mappings are traversed; values under a
/// non-sensitive key keep their shape.
pub fn redact_inputs(inputs: &Map<String, Value>) -> Map<String, Value> {
    inputs
        .iter()
        .map(|(key, value)| {
            let redacted = if is_sensitive_key(key) {
                Value::String(REDACTED.to_string())
            } else if let Value::Object(nested) = value {
                Value::Object(redact_inputs(nested))
            } else {
                value.clone()
            };
            (key.clone(), redacted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_interpolation() {
        let interp = Interpolator::new();
        let inputs = inputs(&[("project", json!("api")), ("env", json!("stage"))]);
        let rendered = interp
            .render("deploy {{project}} --env {{env}}", &inputs)
            .unwrap();
        assert_eq!(rendered, "deploy api --env stage");
    }

    #[test]
    fn test_missing_placeholder_is_an_error() {
        let interp = Interpolator::new();
        let result = interp.render("deploy {{project}}", &Map::new());
        assert!(matches!(result, Err(EngineError::MissingInput(_))));
    }

    #[test]
    fn test_no_html_escaping() {
        let interp = Interpolator::new();
        let inputs = inputs(&[("filter", json!("a && b > c"))]);
        let rendered = interp.render("run {{filter}}", &inputs).unwrap();
        assert_eq!(rendered, "run a && b > c");
    }

    #[test]
    fn test_path_containment_allows_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let resolved = resolve_contained(dir.path(), "sub").unwrap();
        assert!(resolved.ends_with("sub"));
    }

    #[test]
    fn test_path_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve_contained(dir.path(), "../../etc");
        match result {
            Err(EngineError::PathEscape { .. }) => {}
            Err(EngineError::Io(_)) => {} // `../../etc` may not resolve on every host
            other => panic!("expected containment failure, got {:?}", other.map(|_| ())),
        }
        let result = resolve_contained(dir.path(), "/etc");
        assert!(matches!(result, Err(EngineError::PathEscape { .. })));
    }

    #[test]
    fn test_redaction_of_sensitive_keys() {
        let inputs = inputs(&[
            ("project", json!("api")),
            ("api_key", json!("sk-12345")),
            ("DB_PASSWORD", json!("hunter2")),
            ("Bearer", json!("abc")),
        ]);
        let redacted = redact_inputs(&inputs);
        assert_eq!(redacted["project"], json!("api"));
        assert_eq!(redacted["api_key"], json!(REDACTED));
        assert_eq!(redacted["DB_PASSWORD"], json!(REDACTED));
        assert_eq!(redacted["Bearer"], json!(REDACTED));
    }

    #[test]
    fn test_redaction_traverses_nested_maps() {
        let inputs = inputs(&[(
            "connection",
            json!({"host": "db.internal", "credentials": {"user": "svc", "pass": "x"}}),
        )]);
        let redacted = redact_inputs(&inputs);
        assert_eq!(
            redacted["connection"],
            json!({"host": "db.internal", "credentials": REDACTED})
        );
    }

    #[test]
    fn test_non_mapping_values_left_intact() {
        let inputs = inputs(&[("retries", json!(3)), ("flags", json!(["-v", "-q"]))]);
        let redacted = redact_inputs(&inputs);
        assert_eq!(redacted["retries"], json!(3));
        assert_eq!(redacted["flags"], json!(["-v", "-q"]));
    }
}
