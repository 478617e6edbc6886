use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::entities::batch::UploadMode;
use crate::domain::entities::validation::{DuplicatePolicy, FieldRule, ValidationContext};

pub const API_URL_ENV: &str = "SHEET_IMPORT_API_URL";
const CATEGORY_PLACEHOLDER: &str = "{category}";
const MIB: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown import profile: {0}")]
    UnknownProfile(String),
    #[error("profile {profile} needs a category for {field}")]
    MissingCategory { profile: String, field: &'static str },
}

fn default_max_file_bytes() -> usize {
    5 * MIB
}

fn default_chunk_size() -> usize {
    20
}

fn default_true() -> bool {
    true
}

fn default_sync_validation_limit() -> usize {
    1000
}

fn default_validation_slice() -> usize {
    250
}

fn default_payload_key() -> String {
    "data".to_string()
}

/// One import variant: which columns are required, how cells are checked and
/// where valid rows are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProfile {
    pub name: String,
    /// Path under the API base URL; `{category}` is replaced by the selected category id.
    pub endpoint: String,
    #[serde(default = "default_payload_key")]
    pub payload_key: String,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<FieldRule>>,
    #[serde(default)]
    pub unique_key: Option<String>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_true")]
    pub reject_missing_headers: bool,
    /// When set, dynamic columns must match the labels served at this path.
    #[serde(default)]
    pub template_path: Option<String>,
    #[serde(default)]
    pub categories_path: Option<String>,
    #[serde(default)]
    pub example_columns: Vec<String>,
    #[serde(default)]
    pub example_rows: Vec<Vec<String>>,
    #[serde(default)]
    pub upload_mode: UploadMode,
    #[serde(default = "default_sync_validation_limit")]
    pub sync_validation_limit: usize,
    #[serde(default = "default_validation_slice")]
    pub validation_slice: usize,
}

impl ImportProfile {
    /// Cabinet catalog import.
    pub fn catalog() -> Self {
        let mut rules = BTreeMap::new();
        for field in ["height", "width", "depth", "price"] {
            rules.insert(field.to_string(), vec![FieldRule::NonNegativeNumber]);
        }
        Self {
            name: "catalog".to_string(),
            endpoint: "cabinets/import".to_string(),
            payload_key: "cabinets".to_string(),
            required_fields: vec!["code".to_string(), "description".to_string()],
            rules,
            unique_key: Some("code".to_string()),
            duplicate_policy: DuplicatePolicy::Symmetric,
            max_file_bytes: 5 * MIB,
            chunk_size: 20,
            reject_missing_headers: true,
            template_path: None,
            categories_path: None,
            example_columns: vec![
                "height".to_string(),
                "width".to_string(),
                "depth".to_string(),
                "price".to_string(),
            ],
            example_rows: vec![vec![
                "BC-600".to_string(),
                "Base cabinet 600".to_string(),
                "720".to_string(),
                "600".to_string(),
                "560".to_string(),
                "189.00".to_string(),
            ]],
            upload_mode: UploadMode::BestEffort,
            sync_validation_limit: default_sync_validation_limit(),
            validation_slice: default_validation_slice(),
        }
    }

    /// Bulk client import.
    pub fn clients() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert("Name".to_string(), vec![FieldRule::MinLength { len: 2 }]);
        rules.insert("Email Address".to_string(), vec![FieldRule::Email]);
        rules.insert("Phone Number".to_string(), vec![FieldRule::Phone]);
        rules.insert(
            "Status".to_string(),
            vec![FieldRule::OneOf {
                values: vec!["active".to_string(), "inactive".to_string()],
            }],
        );
        Self {
            name: "clients".to_string(),
            endpoint: "clients/csv".to_string(),
            payload_key: "clients".to_string(),
            required_fields: vec!["Name".to_string(), "Email Address".to_string()],
            rules,
            unique_key: Some("Email Address".to_string()),
            duplicate_policy: DuplicatePolicy::Symmetric,
            max_file_bytes: 50 * MIB,
            chunk_size: 50,
            reject_missing_headers: true,
            template_path: None,
            categories_path: None,
            example_columns: vec!["Phone Number".to_string(), "Status".to_string()],
            example_rows: vec![vec![
                "Jordan Price".to_string(),
                "jordan@example.com".to_string(),
                "+1 555 010 2000".to_string(),
                "active".to_string(),
            ]],
            upload_mode: UploadMode::BestEffort,
            sync_validation_limit: default_sync_validation_limit(),
            validation_slice: default_validation_slice(),
        }
    }

    /// Items of a catalog subcategory, checked against the subcategory template.
    pub fn subcategory() -> Self {
        Self {
            name: "subcategory".to_string(),
            endpoint: format!("subcategories/{CATEGORY_PLACEHOLDER}/items/import"),
            payload_key: "data".to_string(),
            template_path: Some(format!("subcategories/{CATEGORY_PLACEHOLDER}/template")),
            categories_path: Some("subcategories".to_string()),
            rules: BTreeMap::new(),
            example_columns: Vec::new(),
            example_rows: vec![vec!["SC-01".to_string(), "Shelf insert".to_string()]],
            ..Self::catalog()
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::catalog(), Self::clients(), Self::subcategory()]
    }

    pub fn validation_context(&self) -> ValidationContext {
        ValidationContext {
            required: self.required_fields.clone(),
            rules: self.rules.clone(),
            unique_key: self.unique_key.clone(),
            duplicate_policy: self.duplicate_policy,
        }
    }

    pub fn needs_category(&self) -> bool {
        self.endpoint.contains(CATEGORY_PLACEHOLDER)
            || self
                .template_path
                .as_deref()
                .is_some_and(|path| path.contains(CATEGORY_PLACEHOLDER))
    }

    pub fn resolve_endpoint(&self, category: Option<&str>) -> Result<String, ConfigError> {
        self.fill_category(&self.endpoint, category, "endpoint")
    }

    pub fn resolve_template_path(
        &self,
        category: Option<&str>,
    ) -> Result<Option<String>, ConfigError> {
        self.template_path
            .as_deref()
            .map(|path| self.fill_category(path, category, "template_path"))
            .transpose()
    }

    fn fill_category(
        &self,
        path: &str,
        category: Option<&str>,
        field: &'static str,
    ) -> Result<String, ConfigError> {
        if !path.contains(CATEGORY_PLACEHOLDER) {
            return Ok(path.to_string());
        }
        match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => Ok(path.replace(CATEGORY_PLACEHOLDER, category)),
            None => Err(ConfigError::MissingCategory {
                profile: self.name.clone(),
                field,
            }),
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
    /// Extra profiles; a profile named like a built-in one replaces it.
    #[serde(default)]
    pub profiles: Vec<ImportProfile>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            journal_path: None,
            profiles: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` when given, otherwise the per-user config file if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().ok().filter(|path| path.is_file()),
        };

        let mut config = match candidate {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!(path = %path.display(), "loaded config");
                Self::from_toml_str(&text, &path)?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url.trim().to_string();
            }
        }

        Ok(config)
    }

    pub fn profile(&self, name: &str) -> Result<ImportProfile, ConfigError> {
        self.profiles
            .iter()
            .find(|profile| profile.name == name)
            .cloned()
            .or_else(|| {
                ImportProfile::builtin()
                    .into_iter()
                    .find(|profile| profile.name == name)
            })
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ImportProfile::builtin()
            .into_iter()
            .map(|profile| profile.name)
            .collect();
        for profile in &self.profiles {
            if !names.contains(&profile.name) {
                names.push(profile.name.clone());
            }
        }
        names
    }

    pub fn journal_path(&self) -> Result<PathBuf> {
        match &self.journal_path {
            Some(path) => Ok(path.clone()),
            None => default_journal_path(),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "workshop", "sheet-import")
        .ok_or_else(|| anyhow!("unable to resolve data directory"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

pub fn default_journal_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_local_dir().join("import-journal.sqlite"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_from_toml_fills_defaults() {
        let text = r#"
            api_base_url = "https://erp.example/api"

            [[profiles]]
            name = "workers"
            endpoint = "workers/import"
            payload_key = "workers"
            required_fields = ["Name", "Role"]
            unique_key = "Name"
            duplicate_policy = "first_wins"

            [profiles.rules]
            "Hourly Rate" = [{ kind = "non_negative_number" }]
            Role = [{ kind = "one_of", values = ["fitter", "painter"] }]
        "#;

        let config = AppConfig::from_toml_str(text, Path::new("config.toml"))
            .expect("config should parse");
        let workers = config.profile("workers").expect("workers profile");

        assert_eq!(config.api_base_url, "https://erp.example/api");
        assert_eq!(workers.chunk_size, 20);
        assert_eq!(workers.max_file_bytes, 5 * MIB);
        assert!(workers.reject_missing_headers);
        assert_eq!(workers.duplicate_policy, DuplicatePolicy::FirstWins);
        assert_eq!(
            workers.rules.get("Hourly Rate"),
            Some(&vec![FieldRule::NonNegativeNumber])
        );
    }

    #[test]
    fn builtin_profiles_are_available_without_config() {
        let config = AppConfig::default();

        let clients = config.profile("clients").expect("clients profile");

        assert_eq!(clients.chunk_size, 50);
        assert_eq!(clients.max_file_bytes, 50 * MIB);
        assert!(matches!(
            config.profile("orders"),
            Err(ConfigError::UnknownProfile(name)) if name == "orders"
        ));
    }

    #[test]
    fn category_placeholder_must_be_filled() {
        let profile = ImportProfile::subcategory();

        assert!(profile.needs_category());
        assert_eq!(
            profile.resolve_endpoint(Some("17")).expect("endpoint"),
            "subcategories/17/items/import"
        );
        assert!(matches!(
            profile.resolve_template_path(None),
            Err(ConfigError::MissingCategory { .. })
        ));
        assert_eq!(
            ImportProfile::catalog()
                .resolve_endpoint(None)
                .expect("endpoint"),
            "cabinets/import"
        );
    }

    #[test]
    fn default_journal_path_uses_app_directory() {
        let path = default_journal_path().expect("journal path should resolve");

        assert_eq!(
            path.file_name().and_then(|name| name.to_str()),
            Some("import-journal.sqlite")
        );
    }
}
