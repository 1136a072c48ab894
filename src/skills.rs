//! Skill Loader and Registry: Markdown-with-YAML-frontmatter capability
//! bundles the agent can load into its system prompt when a trigger phrase
//! matches the user's request.
//!
//! Adapted directly from a standalone skills crate: the `SKILL.md`
//! frontmatter shape, the "subdirectory per skill" loader layout, and the
//! `SkillRegistry` query surface all carry over. What's new here is the
//! three-tier precedence load order this runtime's Design Notes call for:
//! built-in skills ship with the binary, a user-global directory lets an
//! operator add personal skills, and a project-local directory lets a
//! repository ship skills scoped to itself - later tiers shadow earlier ones
//! by name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Where a loaded skill came from, in increasing precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SkillTier {
    Builtin,
    UserGlobal,
    ProjectLocal,
}

/// YAML frontmatter parsed out of a `SKILL.md` file.
#[derive(Debug, Serialize, Deserialize)]
struct SkillFrontmatter {
    name: String,
    description: String,
    #[serde(default)]
    triggers: Vec<String>,
    #[serde(default)]
    tools: Option<Vec<String>>,
}

/// A loaded skill: a name, a description used in skill listings, trigger
/// phrases used for matching, the instructions appended to the system
/// prompt when active, and an optional allow-list restricting which tools
/// the agent loop may use while the skill is active.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub triggers: Vec<String>,
    pub instructions: String,
    pub allowed_tools: Option<Vec<String>>,
    pub tier: SkillTier,
}

impl Skill {
    /// Parse a `SKILL.md` document: `---` delimited YAML frontmatter
    /// followed by Markdown instructions.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the frontmatter delimiters are
    /// missing, or `Error::Yaml` if the frontmatter fails to parse.
    pub fn parse(content: &str, tier: SkillTier) -> Result<Self> {
        let content = content.trim_start();
        if !content.starts_with("---") {
            return Err(Error::invalid_input("SKILL.md is missing '---' frontmatter delimiter"));
        }

        let after_first = &content[3..];
        let close = after_first
            .find("\n---")
            .ok_or_else(|| Error::invalid_input("SKILL.md is missing closing '---' delimiter"))?;

        let frontmatter_src = &after_first[..close];
        let rest = &after_first[close + 4..];
        let instructions = rest.trim_start_matches('\n').trim().to_string();

        let frontmatter: SkillFrontmatter = serde_yaml::from_str(frontmatter_src)?;

        Ok(Self {
            name: frontmatter.name,
            description: frontmatter.description,
            triggers: frontmatter.triggers,
            instructions,
            allowed_tools: frontmatter.tools,
            tier,
        })
    }
}

/// A matched skill and the number of trigger phrases it matched on.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub name: String,
    pub score: usize,
}

/// Discovers `SKILL.md` files under a set of tiered search paths.
#[derive(Debug, Default)]
pub struct SkillLoader {
    paths: Vec<(PathBuf, SkillTier)>,
}

impl SkillLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory of skill subdirectories at the given precedence tier.
    pub fn add_path(mut self, path: impl Into<PathBuf>, tier: SkillTier) -> Self {
        self.paths.push((path.into(), tier));
        self
    }

    /// Load every skill from every configured path, applying tier precedence
    /// when two paths define a skill with the same name (higher tier wins).
    ///
    /// # Errors
    ///
    /// Individual unreadable or malformed skill directories are skipped
    /// rather than failing the whole load, matching the tolerant-recovery
    /// posture of the other stores in this runtime.
    pub fn load_all(&self) -> Result<Vec<Skill>> {
        let mut by_name: HashMap<String, Skill> = HashMap::new();

        let mut ordered = self.paths.clone();
        ordered.sort_by_key(|(_, tier)| *tier);

        for (base_path, tier) in &ordered {
            if !base_path.exists() {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(base_path) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if let Ok(skill) = Self::load_from_dir(&path, *tier) {
                    by_name.insert(skill.name.clone(), skill);
                }
            }
        }

        let mut skills: Vec<Skill> = by_name.into_values().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skills)
    }

    fn load_from_dir(dir: &Path, tier: SkillTier) -> Result<Skill> {
        let skill_file = dir.join("SKILL.md");
        let content = std::fs::read_to_string(&skill_file)
            .map_err(|_| Error::not_found(format!("SKILL.md in {}", dir.display())))?;
        Skill::parse(&content, tier)
    }
}

/// Queryable collection of loaded skills.
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: HashMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the registry from a loader, returning the number of skills
    /// loaded.
    pub fn load_from(&mut self, loader: &SkillLoader) -> Result<usize> {
        let skills = loader.load_all()?;
        let count = skills.len();
        for skill in skills {
            self.register(skill);
        }
        Ok(count)
    }

    pub fn register(&mut self, skill: Skill) {
        self.skills.insert(skill.name.clone(), skill);
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.skills.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn all(&self) -> Vec<&Skill> {
        let mut skills: Vec<&Skill> = self.skills.values().collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn remove(&mut self, name: &str) -> Option<Skill> {
        self.skills.remove(name)
    }

    pub fn clear(&mut self) {
        self.skills.clear();
    }

    /// Score every skill against a prompt by counting case-insensitive
    /// trigger-phrase substring matches, returning only skills that matched
    /// at least once, highest score first.
    pub fn match_prompt(&self, prompt: &str) -> Vec<MatchResult> {
        let lower = prompt.to_lowercase();
        let mut hits: Vec<MatchResult> = self
            .skills
            .values()
            .filter_map(|skill| {
                let score = skill
                    .triggers
                    .iter()
                    .filter(|t| lower.contains(&t.to_lowercase()))
                    .count();
                (score > 0).then_some(MatchResult {
                    name: skill.name.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE_SKILL: &str = r#"---
name: code-review
description: Reviews code for bugs and style issues.
triggers:
  - review this code
  - check my diff
tools:
  - read_file
---

# Code Review

Read the referenced files and summarize defects.
"#;

    #[test]
    fn test_parse_skill_frontmatter_and_body() {
        let skill = Skill::parse(SAMPLE_SKILL, SkillTier::Builtin).unwrap();
        assert_eq!(skill.name, "code-review");
        assert_eq!(skill.triggers.len(), 2);
        assert_eq!(skill.allowed_tools.as_ref().unwrap(), &vec!["read_file".to_string()]);
        assert!(skill.instructions.starts_with("# Code Review"));
    }

    #[test]
    fn test_parse_missing_frontmatter_fails() {
        let err = Skill::parse("no frontmatter here", SkillTier::Builtin).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_parse_unclosed_frontmatter_fails() {
        let err = Skill::parse("---\nname: x\ndescription: y", SkillTier::Builtin).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    fn write_skill(dir: &Path, name: &str, content: &str) {
        let skill_dir = dir.join(name);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join("SKILL.md"), content).unwrap();
    }

    #[test]
    fn test_loader_loads_from_single_path() {
        let dir = tempdir().unwrap();
        write_skill(dir.path(), "code-review", SAMPLE_SKILL);

        let loader = SkillLoader::new().add_path(dir.path(), SkillTier::Builtin);
        let skills = loader.load_all().unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "code-review");
    }

    #[test]
    fn test_loader_project_local_shadows_builtin() {
        let builtin_dir = tempdir().unwrap();
        let project_dir = tempdir().unwrap();

        write_skill(builtin_dir.path(), "code-review", SAMPLE_SKILL);
        let overridden = SAMPLE_SKILL.replace("Reviews code for bugs and style issues.", "Custom project review.");
        write_skill(project_dir.path(), "code-review", &overridden);

        let loader = SkillLoader::new()
            .add_path(builtin_dir.path(), SkillTier::Builtin)
            .add_path(project_dir.path(), SkillTier::ProjectLocal);
        let skills = loader.load_all().unwrap();

        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].description, "Custom project review.");
        assert_eq!(skills[0].tier, SkillTier::ProjectLocal);
    }

    #[test]
    fn test_loader_skips_missing_paths() {
        let loader = SkillLoader::new().add_path("/does/not/exist", SkillTier::Builtin);
        let skills = loader.load_all().unwrap();
        assert!(skills.is_empty());
    }

    #[test]
    fn test_registry_match_prompt_scores_by_trigger_count() {
        let mut registry = SkillRegistry::new();
        registry.register(Skill::parse(SAMPLE_SKILL, SkillTier::Builtin).unwrap());

        let hits = registry.match_prompt("Could you review this code and check my diff?");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 2);
    }

    #[test]
    fn test_registry_match_prompt_no_match() {
        let mut registry = SkillRegistry::new();
        registry.register(Skill::parse(SAMPLE_SKILL, SkillTier::Builtin).unwrap());

        let hits = registry.match_prompt("what's the weather today");
        assert!(hits.is_empty());
    }

    #[test]
    fn test_registry_basic_accessors() {
        let mut registry = SkillRegistry::new();
        assert!(registry.is_empty());
        registry.register(Skill::parse(SAMPLE_SKILL, SkillTier::Builtin).unwrap());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("code-review"));
        assert!(registry.get("code-review").is_some());
        assert_eq!(registry.names(), vec!["code-review"]);

        registry.remove("code-review");
        assert!(registry.is_empty());
    }
}
