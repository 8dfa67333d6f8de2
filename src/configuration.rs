use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub qdrant: QdrantSettings,
    pub embedding: EmbeddingSettings,
    pub image_loader: ImageLoaderSettings,
    pub search: SearchSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantSettings {
    /// gRPC endpoint, ex: `http://localhost:6334`
    pub url: String,
    /// Only needed for managed clusters
    #[serde(default)]
    pub api_key: Option<Secret<String>>,
    pub collection: String,
    /// Name of a Qdrant distance: `Dot`, `Cosine` or `Euclid`
    pub collection_distance: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub collection_vector_size: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
}

impl QdrantSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where to find the dual encoder weights.
///
/// `text_model`, `vision_model` and `vocab` are either `http(s)` URLs, downloaded once and cached
/// by `rust-bert`, or paths on the local file system.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingSettings {
    pub model_name: String,
    pub text_model: String,
    pub vision_model: String,
    pub vocab: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub dimension: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_sequence_length: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub image_size: u32,
    pub normalize_embeddings: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageLoaderSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl ImageLoaderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub default_limit: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 3,
            max_limit: 6,
        }
    }
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` contains the settings shared by all environments, `develop.yaml`, `local.yaml`
/// and `production.yaml` the specific ones. The environment is read from `APP_ENVIRONMENT`
/// and defaults to `develop`.
///
/// Environment variables prefixed with `APP` and using `__` as separator override files.
/// For ex: `APP_QDRANT__URL=http://qdrant:6334` sets `Settings.qdrant.url`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {e}")))?;

    get_configuration_from(base_path.join("configuration"))
}

/// Same as `get_configuration`, reading the files from `configuration_directory`
pub fn get_configuration_from(
    configuration_directory: PathBuf,
) -> Result<Settings, config::ConfigError> {
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "develop".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
#[derive(Debug, PartialEq, Eq)]
pub enum Environment {
    Develop,
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `develop`, `local` or `production`.",
                other
            )),
        }
    }
}
