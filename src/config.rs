use crate::gate::{DEFAULT_MAX_FILE_SIZE, FileType};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion pipeline.
///
/// Built once at process start and handed to every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the document analysis service, without a trailing slash.
    pub analysis_endpoint: String,
    /// Subscription key sent with every analysis request.
    pub analysis_api_key: String,
    /// Analysis model identifier used in the analyze route.
    pub analysis_model: String,
    /// API version query parameter for the analysis service.
    pub analysis_api_version: String,
    /// Base URL of the search service.
    pub search_endpoint: String,
    /// Name of the index receiving records.
    pub search_index_name: String,
    /// Admin key for the search service.
    pub search_api_key: String,
    /// API version query parameter for the search service.
    pub search_api_version: String,
    /// Root directory backing blob storage, the failure sink, and the queue.
    pub storage_root: PathBuf,
    /// Poll loop behaviour.
    pub poll: PollSettings,
    /// Optional deadline covering submission plus polling.
    pub analysis_timeout: Option<Duration>,
    /// Largest accepted document in bytes.
    pub max_file_size: u64,
    /// Document types the gate accepts.
    pub allowed_file_types: Vec<FileType>,
    /// Where failed payloads go.
    pub failure_policy: FailurePolicy,
    /// How index record identifiers are produced.
    pub record_id_strategy: RecordIdStrategy,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Bounded fixed-delay polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Maximum number of status queries issued for one job.
    pub max_rounds: u32,
    /// Wait between two consecutive rounds.
    pub delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            delay: Duration::from_millis(2000),
        }
    }
}

/// Diversion rules for payloads that could not be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Quarantine the original bytes when submission or polling fails.
    pub divert_analysis_failures: bool,
    /// Divert the analysis payload when extraction, building, or publishing fails.
    pub divert_index_failures: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            divert_analysis_failures: false,
            divert_index_failures: true,
        }
    }
}

/// Identifier scheme for index records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordIdStrategy {
    /// Hex SHA-256 of the canonical file name; re-runs overwrite the same record.
    #[default]
    FileName,
    /// Fresh UUID v4 per record.
    Random,
}

impl std::str::FromStr for RecordIdStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "filename" | "file_name" | "derived" => Ok(Self::FileName),
            "random" | "uuid" => Ok(Self::Random),
            _ => Err(()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Lookup(lookup);
        let poll = PollSettings {
            max_rounds: vars
                .parsed("POLL_MAX_ROUNDS")?
                .unwrap_or(PollSettings::default().max_rounds),
            delay: vars
                .parsed("POLL_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(PollSettings::default().delay),
        };
        if poll.max_rounds == 0 {
            return Err(ConfigError::InvalidValue("POLL_MAX_ROUNDS".into()));
        }

        let allowed_file_types = match vars.optional("ALLOWED_FILE_TYPES") {
            Some(raw) => parse_file_types(&raw)?,
            None => FileType::ALL.to_vec(),
        };

        Ok(Self {
            analysis_endpoint: trim_endpoint(&vars.required("DOC_ANALYSIS_ENDPOINT")?),
            analysis_api_key: vars.required("DOC_ANALYSIS_KEY")?,
            analysis_model: vars
                .optional("DOC_ANALYSIS_MODEL")
                .unwrap_or_else(|| "prebuilt-layout".into()),
            analysis_api_version: vars
                .optional("DOC_ANALYSIS_API_VERSION")
                .unwrap_or_else(|| "2023-07-31".into()),
            search_endpoint: trim_endpoint(&vars.required("SEARCH_ENDPOINT")?),
            search_index_name: vars.required("SEARCH_INDEX_NAME")?,
            search_api_key: vars.required("SEARCH_API_KEY")?,
            search_api_version: vars
                .optional("SEARCH_API_VERSION")
                .unwrap_or_else(|| "2023-11-01".into()),
            storage_root: vars
                .optional("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("storage")),
            poll,
            analysis_timeout: vars
                .parsed("ANALYSIS_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            max_file_size: vars
                .parsed("MAX_FILE_SIZE_BYTES")?
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
            allowed_file_types,
            failure_policy: FailurePolicy {
                divert_analysis_failures: vars
                    .flag("DIVERT_ANALYSIS_FAILURES")?
                    .unwrap_or(FailurePolicy::default().divert_analysis_failures),
                divert_index_failures: vars
                    .flag("DIVERT_INDEX_FAILURES")?
                    .unwrap_or(FailurePolicy::default().divert_index_failures),
            },
            record_id_strategy: vars
                .optional("RECORD_ID_STRATEGY")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("RECORD_ID_STRATEGY".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            server_port: vars.parsed("SERVER_PORT")?,
        })
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.optional(key)
            .map(|value| match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidValue(key.to_string())),
            })
            .transpose()
    }
}

fn trim_endpoint(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn parse_file_types(raw: &str) -> Result<Vec<FileType>, ConfigError> {
    let mut types = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let file_type = FileType::from_extension(item)
            .ok_or_else(|| ConfigError::InvalidValue("ALLOWED_FILE_TYPES".into()))?;
        if !types.contains(&file_type) {
            types.push(file_type);
        }
    }
    if types.is_empty() {
        return Err(ConfigError::InvalidValue("ALLOWED_FILE_TYPES".into()));
    }
    Ok(types)
}

/// Load configuration from `.env` and the environment.
pub fn init_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        analysis_endpoint = %config.analysis_endpoint,
        search_endpoint = %config.search_endpoint,
        index = %config.search_index_name,
        storage_root = %config.storage_root.display(),
        max_rounds = config.poll.max_rounds,
        delay_ms = config.poll.delay.as_millis() as u64,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(config)
}

/// Config for unit tests that inject their own collaborators; nothing reads `storage_root`.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        analysis_endpoint: "http://127.0.0.1:1".into(),
        analysis_api_key: "analysis-key".into(),
        analysis_model: "prebuilt-layout".into(),
        analysis_api_version: "2023-07-31".into(),
        search_endpoint: "http://127.0.0.1:1".into(),
        search_index_name: "documents".into(),
        search_api_key: "search-key".into(),
        search_api_version: "2023-11-01".into(),
        storage_root: PathBuf::new(),
        poll: PollSettings {
            max_rounds: 5,
            delay: Duration::from_millis(1),
        },
        analysis_timeout: None,
        max_file_size: DEFAULT_MAX_FILE_SIZE,
        allowed_file_types: FileType::ALL.to_vec(),
        failure_policy: FailurePolicy::default(),
        record_id_strategy: RecordIdStrategy::FileName,
        server_port: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 5] = [
        ("DOC_ANALYSIS_ENDPOINT", "https://analysis.example.com/"),
        ("DOC_ANALYSIS_KEY", "secret"),
        ("SEARCH_ENDPOINT", "https://search.example.com"),
        ("SEARCH_INDEX_NAME", "docs"),
        ("SEARCH_API_KEY", "admin"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_missing() {
        let config = Config::from_lookup(lookup(&REQUIRED)).expect("config");
        assert_eq!(config.analysis_endpoint, "https://analysis.example.com");
        assert_eq!(config.poll, PollSettings::default());
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.allowed_file_types.len(), 6);
        assert_eq!(config.failure_policy, FailurePolicy::default());
        assert_eq!(config.record_id_strategy, RecordIdStrategy::FileName);
        assert!(config.analysis_timeout.is_none());
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let err = Config::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable(key) if key == "DOC_ANALYSIS_ENDPOINT"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("POLL_MAX_ROUNDS", "3"),
            ("POLL_DELAY_MS", "250"),
            ("ALLOWED_FILE_TYPES", "PDF, txt,pdf"),
            ("DIVERT_ANALYSIS_FAILURES", "yes"),
            ("DIVERT_INDEX_FAILURES", "false"),
            ("RECORD_ID_STRATEGY", "random"),
            ("ANALYSIS_TIMEOUT_SECS", "90"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).expect("config");
        assert_eq!(config.poll.max_rounds, 3);
        assert_eq!(config.poll.delay, Duration::from_millis(250));
        assert_eq!(config.allowed_file_types, vec![FileType::Pdf, FileType::Txt]);
        assert!(config.failure_policy.divert_analysis_failures);
        assert!(!config.failure_policy.divert_index_failures);
        assert_eq!(config.record_id_strategy, RecordIdStrategy::Random);
        assert_eq!(config.analysis_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn zero_rounds_and_unknown_types_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLL_MAX_ROUNDS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALLOWED_FILE_TYPES", "pdf,exe"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::InvalidValue(key)) if key == "ALLOWED_FILE_TYPES"
        ));
    }
}
