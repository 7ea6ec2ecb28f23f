//! Configuration file support for playforge.
//!
//! Loads `playforge.toml` from the working directory and
//! `config.toml` from the user's `playforge` config directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use playforge_agent::ProviderConfig;
use playforge_core::{Stage, StageModels};

/// The project config file name
pub const CONFIG_FILE_NAME: &str = "playforge.toml";
/// Directory under the platform config dir holding the global config
pub const GLOBAL_CONFIG_DIR: &str = "playforge";
/// The global config file name
pub const GLOBAL_CONFIG_FILE: &str = "config.toml";

/// Schema shared by the project and global config files
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PlayforgeConfig {
    /// Default model for every stage
    pub model: Option<String>,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub ideas: StageSection,
    #[serde(default)]
    pub requirements: StageSection,
    #[serde(default)]
    pub specification: StageSection,
    #[serde(default)]
    pub code: StageSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StageSection {
    pub model: Option<String>,
}

impl PlayforgeConfig {
    /// Load `playforge.toml` from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load_project(working_dir: &Path) -> Result<Option<Self>> {
        Self::load_from(&working_dir.join(CONFIG_FILE_NAME))
    }

    /// Load the global config, if the platform has a config directory and the file exists
    pub fn load_global() -> Result<Option<Self>> {
        match global_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config: PlayforgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(Some(config))
    }

    /// Effective model for a stage.
    /// Priority: [stage].model > global model > None
    pub fn stage_model(&self, stage: Stage) -> Option<&str> {
        let section = match stage {
            Stage::IdeaSelection => &self.ideas,
            Stage::RequirementsGathering => &self.requirements,
            Stage::SpecificationReview => &self.specification,
            Stage::CodeGeneration => &self.code,
            Stage::ConceptSelection | Stage::Done => return None,
        };
        section.model.as_deref().or(self.model.as_deref())
    }
}

pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(GLOBAL_CONFIG_DIR).join(GLOBAL_CONFIG_FILE))
}

/// Fully resolved settings for one run
#[derive(Debug)]
pub struct Settings {
    pub models: StageModels,
    pub provider: ProviderConfig,
}

impl Settings {
    /// Merge layers. Precedence: CLI flag > project config > global config > built-in default
    pub fn resolve(
        cli_model: Option<&str>,
        project: Option<&PlayforgeConfig>,
        global: Option<&PlayforgeConfig>,
    ) -> Self {
        let layers = [project, global];
        let defaults = StageModels::default();

        let model_for = |stage: Stage, fallback: &str| -> String {
            cli_model
                .map(String::from)
                .or_else(|| first(&layers, |c| c.stage_model(stage).map(String::from)))
                .unwrap_or_else(|| fallback.to_string())
        };
        let models = StageModels {
            ideas: model_for(Stage::IdeaSelection, &defaults.ideas),
            requirements: model_for(Stage::RequirementsGathering, &defaults.requirements),
            specification: model_for(Stage::SpecificationReview, &defaults.specification),
            code: model_for(Stage::CodeGeneration, &defaults.code),
        };

        let mut provider = ProviderConfig::default();
        if let Some(base_url) = first(&layers, |c| c.provider.base_url.clone()) {
            provider.base_url = base_url;
        }
        if let Some(env) = first(&layers, |c| c.provider.api_key_env.clone()) {
            provider.api_key_env = env;
        }
        if let Some(secs) = first(&layers, |c| c.provider.timeout_secs) {
            provider.timeout = Some(Duration::from_secs(secs));
        }

        Self { models, provider }
    }
}

fn first<T>(
    layers: &[Option<&PlayforgeConfig>],
    pick: impl Fn(&PlayforgeConfig) -> Option<T>,
) -> Option<T> {
    layers.iter().flatten().find_map(|config| pick(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(content: &str) -> PlayforgeConfig {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PlayforgeConfig::load_project(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_project_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
model = "gpt-4.1-mini"

[provider]
base_url = "http://localhost:8080/v1"
timeout_secs = 60

[code]
model = "gpt-5"
"#,
        )
        .unwrap();

        let config = PlayforgeConfig::load_project(dir.path()).unwrap().unwrap();
        assert_eq!(config.stage_model(Stage::CodeGeneration), Some("gpt-5"));
        assert_eq!(config.stage_model(Stage::IdeaSelection), Some("gpt-4.1-mini"));
        assert_eq!(config.stage_model(Stage::ConceptSelection), None);
        assert_eq!(config.provider.timeout_secs, Some(60));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "modle = \"typo\"\n").unwrap();
        let err = PlayforgeConfig::load_project(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_defaults_without_config() {
        let settings = Settings::resolve(None, None, None);
        assert_eq!(settings.models, StageModels::default());
        assert_eq!(settings.provider.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(settings.provider.timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_precedence() {
        let project = parse(
            r#"
[requirements]
model = "project-requirements"

[provider]
api_key_env = "PROJECT_KEY"
"#,
        );
        let global = parse(
            r#"
model = "global-default"

[provider]
api_key_env = "GLOBAL_KEY"
base_url = "https://proxy.example/v1"
"#,
        );

        let settings = Settings::resolve(None, Some(&project), Some(&global));
        assert_eq!(settings.models.requirements, "project-requirements");
        assert_eq!(settings.models.ideas, "global-default");
        assert_eq!(settings.provider.api_key_env, "PROJECT_KEY");
        assert_eq!(settings.provider.base_url, "https://proxy.example/v1");

        let settings = Settings::resolve(Some("cli-model"), Some(&project), Some(&global));
        assert_eq!(settings.models, StageModels::uniform("cli-model"));
    }
}
