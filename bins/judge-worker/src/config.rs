// Language recipe registry for the judge worker
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SOURCE_PLACEHOLDER: &str = "{source}";
pub const BINARY_PLACEHOLDER: &str = "{binary}";
pub const DIR_PLACEHOLDER: &str = "{dir}";

fn default_file_stem() -> String {
    "main".to_string()
}

/// How to build and run one language.
///
/// Commands are argv templates; every token may contain `{source}`,
/// `{binary}` or `{dir}`, which are replaced with paths inside the job's
/// scratch directory. No shell is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageRecipe {
    pub extension: String,
    /// Source file name without extension. Java needs it to match the entry class.
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
    #[serde(default)]
    pub build: Option<Vec<String>>,
    pub run: Vec<String>,
}

/// Concrete paths a recipe is expanded against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipePaths {
    pub dir: PathBuf,
    pub source: PathBuf,
    pub binary: PathBuf,
}

impl LanguageRecipe {
    /// An empty `build` slice means the language runs straight from source
    pub fn new(extension: &str, build: &[&str], run: &[&str]) -> Self {
        Self {
            extension: extension.to_string(),
            file_stem: default_file_stem(),
            build: (!build.is_empty()).then(|| build.iter().map(|s| s.to_string()).collect()),
            run: run.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_file_stem(mut self, stem: &str) -> Self {
        self.file_stem = stem.to_string();
        self
    }

    pub fn source_file_name(&self) -> String {
        format!("{}.{}", self.file_stem, self.extension)
    }

    pub fn needs_build(&self) -> bool {
        self.build.as_ref().is_some_and(|cmd| !cmd.is_empty())
    }

    /// Lay the recipe's file names out inside a scratch directory
    pub fn paths_in(&self, dir: &Path) -> RecipePaths {
        RecipePaths {
            dir: dir.to_path_buf(),
            source: dir.join(self.source_file_name()),
            binary: dir.join(format!("{}.bin", self.file_stem)),
        }
    }

    pub fn build_command(&self, paths: &RecipePaths) -> Option<Vec<String>> {
        self.build
            .as_ref()
            .filter(|cmd| !cmd.is_empty())
            .map(|cmd| expand(cmd, paths))
    }

    pub fn run_command(&self, paths: &RecipePaths) -> Vec<String> {
        expand(&self.run, paths)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.run.is_empty() {
            bail!("Language '{}' has an empty run command", name);
        }
        if self.extension.trim().is_empty() {
            bail!("Language '{}' has no file extension", name);
        }
        Ok(())
    }
}

fn expand(template: &[String], paths: &RecipePaths) -> Vec<String> {
    let dir = paths.dir.to_string_lossy();
    let source = paths.source.to_string_lossy();
    let binary = paths.binary.to_string_lossy();

    template
        .iter()
        .map(|token| {
            token
                .replace(SOURCE_PLACEHOLDER, &source)
                .replace(BINARY_PLACEHOLDER, &binary)
                .replace(DIR_PLACEHOLDER, &dir)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

#[derive(Debug, Serialize, Deserialize)]
struct LanguageEntry {
    name: String,
    #[serde(flatten)]
    recipe: LanguageRecipe,
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageEntry>,
}

/// Language tag → recipe table. Built once at start-up and read-only after.
#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    recipes: HashMap<String, LanguageRecipe>,
}

impl LanguageRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Recipes for the toolchains the judge ships with
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "go",
            LanguageRecipe::new("go", &["go", "build", "-o", "{binary}", "{source}"], &["{binary}"]),
        );
        registry.register("python", LanguageRecipe::new("py", &[], &["python3", "{source}"]));
        registry.register("javascript", LanguageRecipe::new("js", &[], &["node", "{source}"]));
        registry.register(
            "c",
            LanguageRecipe::new("c", &["gcc", "{source}", "-o", "{binary}"], &["{binary}"]),
        );
        registry.register(
            "java",
            LanguageRecipe::new("java", &["javac", "{source}"], &["java", "-cp", "{dir}", "Main"])
                .with_file_stem("Main"),
        );
        registry
    }

    /// Load recipes from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;

        let mut registry = Self::empty();
        for entry in languages_json.languages {
            entry.recipe.validate(&entry.name)?;
            registry.register(&entry.name, entry.recipe);
        }
        Ok(registry)
    }

    /// Built-in recipes, overridden or extended by the file when it exists
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        let mut registry = Self::builtin();
        if config_path.exists() {
            registry.merge(Self::load(config_path)?);
        }
        Ok(registry)
    }

    pub fn register(&mut self, tag: &str, recipe: LanguageRecipe) {
        self.recipes.insert(normalize_tag(tag), recipe);
    }

    pub fn merge(&mut self, other: LanguageRegistry) {
        self.recipes.extend(other.recipes);
    }

    pub fn recipe_for(&self, tag: &str) -> Result<&LanguageRecipe, UnsupportedLanguage> {
        self.recipes
            .get(&normalize_tag(tag))
            .ok_or_else(|| UnsupportedLanguage(tag.to_string()))
    }

    /// List all supported languages, sorted
    pub fn list_languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.recipes.keys().cloned().collect();
        languages.sort();
        languages
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}
