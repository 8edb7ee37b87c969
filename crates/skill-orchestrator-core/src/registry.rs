// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Registry loading for skill and workflow specs.
//!
//! Specs are discovered on disk, parsed, schema-validated and exposed as
//! immutable records keyed by name. A bad file is reported and skipped so
//! one broken spec never takes the rest of the registry down. The only
//! condition that aborts loading outright is a schema file present while
//! the validator is compiled out.
//!
//! Duplicate names are rejected (the first spec wins, the duplicate is an
//! error); last-wins would let a later file silently shadow an audited one.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::skill::Skill;
use crate::workflow::Workflow;

/// Schema enforcement for one registry.
enum SpecValidator {
    #[cfg(feature = "schema-validation")]
    Schema(jsonschema::Validator),
    Disabled,
}

impl SpecValidator {
    /// Load the validator for a schema path.
    ///
    /// A schema on disk is a promise that specs are validated; when the
    /// validator is not compiled in, that promise cannot be kept and
    /// loading fails with `SchemaValidatorMissing`.
    fn load(schema_path: &Path) -> Result<Self> {
        if !schema_path.exists() {
            return Ok(Self::Disabled);
        }

        #[cfg(feature = "schema-validation")]
        {
            let doc: Value = serde_json::from_str(&fs::read_to_string(schema_path)?)?;
            let validator = jsonschema::validator_for(&doc).map_err(|e| {
                EngineError::validation(format!(
                    "Invalid schema {}: {e}",
                    schema_path.display()
                ))
            })?;
            Ok(Self::Schema(validator))
        }

        #[cfg(not(feature = "schema-validation"))]
        {
            Err(EngineError::SchemaValidatorMissing {
                schema: schema_path.to_path_buf(),
            })
        }
    }

    fn validate(&self, doc: &Value) -> Result<()> {
        match self {
            #[cfg(feature = "schema-validation")]
            Self::Schema(validator) => validator
                .validate(doc)
                .map_err(|e| EngineError::validation(e.to_string())),
            Self::Disabled => Ok(()),
        }
    }
}

/// Registry of skill definitions.
pub struct SkillRegistry {
    config: EngineConfig,
    skills: RwLock<HashMap<String, Skill>>,
}

impl SkillRegistry {
    /// Discover and load all skills under the configured skills directory.
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let skills = Self::load_all(config)?;
        info!(count = skills.len(), dir = %config.skills_path().display(), "Skill registry loaded");
        Ok(Self {
            config: config.clone(),
            skills: RwLock::new(skills),
        })
    }

    /// Reload all skills from disk, replacing the current registry.
    pub fn reload(&self) -> Result<()> {
        let skills = Self::load_all(&self.config)?;
        info!(count = skills.len(), "Skill registry reloaded");
        *self.skills.write() = skills;
        Ok(())
    }

    fn load_all(config: &EngineConfig) -> Result<HashMap<String, Skill>> {
        let validator = SpecValidator::load(&config.skill_schema_path())?;
        let mut skills = HashMap::new();

        let skills_dir = config.skills_path();
        if !skills_dir.is_dir() {
            warn!(dir = %skills_dir.display(), "Skills directory not found");
            return Ok(skills);
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(&skills_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        entries.sort();

        for dir in entries {
            let spec_path = dir.join("skill.json");
            if !spec_path.is_file() {
                continue;
            }
            match load_spec::<Skill>(&spec_path, &validator, |s| s.validate()) {
                Ok(mut skill) => {
                    if skills.contains_key(&skill.name) {
                        error!(
                            file = %spec_path.display(),
                            name = %skill.name,
                            "Duplicate skill name; keeping the first definition"
                        );
                        continue;
                    }
                    skill.source_dir = Some(dir.clone());
                    info!(name = %skill.name, version = %skill.version, "Loaded skill");
                    skills.insert(skill.name.clone(), skill);
                }
                Err(e) => error!(file = %spec_path.display(), error = %e, "Failed to load skill"),
            }
        }

        Ok(skills)
    }

    /// Sorted list of available skill names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up a skill by name.
    pub fn get(&self, name: &str) -> Option<Skill> {
        self.skills.read().get(name).cloned()
    }

    /// Whether a skill exists. The agent cannot claim one into existence.
    pub fn contains(&self, name: &str) -> bool {
        self.skills.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.skills.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.read().is_empty()
    }
}

/// Registry of workflow definitions.
pub struct WorkflowRegistry {
    config: EngineConfig,
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl WorkflowRegistry {
    /// Discover and load all workflows, cross-checking phase skills
    /// against the skill registry. Unresolved skill references are
    /// warnings, not errors, so workflows can be authored ahead of their
    /// skills.
    pub fn load(config: &EngineConfig, skills: &SkillRegistry) -> Result<Self> {
        let workflows = Self::load_all(config, skills)?;
        info!(count = workflows.len(), dir = %config.workflows_path().display(), "Workflow registry loaded");
        Ok(Self {
            config: config.clone(),
            workflows: RwLock::new(workflows),
        })
    }

    /// Reload all workflows from disk.
    pub fn reload(&self, skills: &SkillRegistry) -> Result<()> {
        let workflows = Self::load_all(&self.config, skills)?;
        info!(count = workflows.len(), "Workflow registry reloaded");
        *self.workflows.write() = workflows;
        Ok(())
    }

    fn load_all(config: &EngineConfig, skills: &SkillRegistry) -> Result<HashMap<String, Workflow>> {
        let validator = SpecValidator::load(&config.workflow_schema_path())?;
        let mut workflows = HashMap::new();

        let workflows_dir = config.workflows_path();
        if !workflows_dir.is_dir() {
            warn!(dir = %workflows_dir.display(), "Workflows directory not found");
            return Ok(workflows);
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(&workflows_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        entries.sort();

        for path in entries {
            match load_spec::<Workflow>(&path, &validator, |w| w.validate()) {
                Ok(mut workflow) => {
                    if workflows.contains_key(&workflow.name) {
                        error!(
                            file = %path.display(),
                            name = %workflow.name,
                            "Duplicate workflow name; keeping the first definition"
                        );
                        continue;
                    }
                    for phase in &workflow.phases {
                        if !skills.contains(&phase.skill) {
                            warn!(
                                workflow = %workflow.name,
                                phase = %phase.name,
                                skill = %phase.skill,
                                "Phase references a skill that is not loaded"
                            );
                        }
                    }
                    workflow.source_path = Some(path.clone());
                    info!(name = %workflow.name, version = %workflow.version, "Loaded workflow");
                    workflows.insert(workflow.name.clone(), workflow);
                }
                Err(e) => error!(file = %path.display(), error = %e, "Failed to load workflow"),
            }
        }

        Ok(workflows)
    }

    /// Sorted list of available workflow names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up a workflow by name.
    pub fn get(&self, name: &str) -> Option<Workflow> {
        self.workflows.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workflows.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

fn load_spec<T>(
    path: &Path,
    validator: &SpecValidator,
    check: impl FnOnce(&T) -> Result<()>,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let content = fs::read_to_string(path)?;
    let doc: Value =
        serde_json::from_str(&content).map_err(|e| EngineError::parse(e.to_string()))?;
    validator.validate(&doc)?;
    let spec: T = serde_json::from_value(doc).map_err(|e| EngineError::parse(e.to_string()))?;
    check(&spec)?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_skill(dir: &Path, name: &str, body: Value) {
        let skill_dir = dir.join("SKILLS").join(name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("skill.json"), body.to_string()).unwrap();
    }

    fn write_workflow(dir: &Path, name: &str, body: Value) {
        let wf_dir = dir.join("WORKFLOWS");
        fs::create_dir_all(&wf_dir).unwrap();
        fs::write(wf_dir.join(format!("{name}.json")), body.to_string()).unwrap();
    }

    fn skill_body(name: &str) -> Value {
        json!({
            "name": name,
            "version": "1.0.0",
            "autonomy": "delegado",
            "steps": [{"id": "noop", "type": "bash", "cmd": "true"}]
        })
    }

    #[test]
    fn test_load_skills_and_workflows() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "build", skill_body("build"));
        write_skill(dir.path(), "deploy", skill_body("deploy"));
        write_workflow(
            dir.path(),
            "release",
            json!({
                "name": "release",
                "version": "1.0.0",
                "phases": [
                    {"name": "build", "skill": "build"},
                    {"name": "deploy", "skill": "deploy"}
                ]
            }),
        );

        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        assert_eq!(skills.len(), 2);
        assert_eq!(skills.names(), vec!["build", "deploy"]);
        assert_eq!(
            skills.get("build").unwrap().source_dir,
            Some(dir.path().join("SKILLS").join("build"))
        );

        let workflows = WorkflowRegistry::load(&config, &skills).unwrap();
        assert_eq!(workflows.len(), 1);
        assert!(workflows.contains("release"));
    }

    #[test]
    fn test_bad_file_is_skipped_others_load() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "good", skill_body("good"));
        let bad_dir = dir.path().join("SKILLS").join("bad");
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join("skill.json"), "{not json").unwrap();

        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        assert_eq!(skills.names(), vec!["good"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        // Two directories declaring the same skill name.
        write_skill(dir.path(), "a-first", skill_body("shared"));
        write_skill(dir.path(), "b-second", skill_body("shared"));

        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        assert_eq!(skills.len(), 1);
        // Directory order is sorted, so the first definition wins.
        assert_eq!(
            skills.get("shared").unwrap().source_dir,
            Some(dir.path().join("SKILLS").join("a-first"))
        );
    }

    #[test]
    fn test_unresolved_phase_skill_is_warning_not_error() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(
            dir.path(),
            "staged",
            json!({
                "name": "staged",
                "version": "0.1.0",
                "phases": [{"name": "future", "skill": "not-written-yet"}]
            }),
        );

        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        let workflows = WorkflowRegistry::load(&config, &skills).unwrap();
        assert!(workflows.contains("staged"));
    }

    #[test]
    fn test_missing_directories_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        assert!(skills.is_empty());
        let workflows = WorkflowRegistry::load(&config, &skills).unwrap();
        assert!(workflows.is_empty());
    }

    #[cfg(feature = "schema-validation")]
    #[test]
    fn test_schema_validation_skips_nonconforming_spec() {
        let dir = tempfile::tempdir().unwrap();
        let schema_dir = dir.path().join("schemas");
        fs::create_dir_all(&schema_dir).unwrap();
        fs::write(
            schema_dir.join("skill-schema.json"),
            json!({
                "type": "object",
                "required": ["name", "version", "autonomy", "steps"],
                "properties": {"version": {"type": "string", "pattern": "^\\d+\\.\\d+\\.\\d+$"}}
            })
            .to_string(),
        )
        .unwrap();

        write_skill(dir.path(), "ok", skill_body("ok"));
        // Version fails the schema pattern.
        write_skill(
            dir.path(),
            "bad-version",
            json!({
                "name": "bad-version",
                "version": "one",
                "autonomy": "delegado",
                "steps": []
            }),
        );

        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        assert_eq!(skills.names(), vec!["ok"]);
    }

    #[test]
    fn test_reload_picks_up_new_specs() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "one", skill_body("one"));

        let config = EngineConfig::new(dir.path());
        let skills = SkillRegistry::load(&config).unwrap();
        assert_eq!(skills.len(), 1);

        write_skill(dir.path(), "two", skill_body("two"));
        skills.reload().unwrap();
        assert_eq!(skills.len(), 2);
    }
}
