use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

pub const DEFAULT_KNOWN_SERVICES: [&str; 4] = [
    "product-service",
    "order-service",
    "payment-service",
    "rag-service",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub http_addr: String,
    pub db_path: PathBuf,
    pub docs_path: PathBuf,
    pub known_services: Vec<String>,

    pub jaeger_api_url: String,
    pub jaeger_timeout: Duration,
    pub source_max_retries: u32,
    pub source_retry_delay: Duration,
    pub batch_max_attempts: u32,
    pub batch_backoff: Duration,

    pub embedding_api_base: String,
    pub embedding_path: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    pub embedding_timeout: Duration,

    pub llm_api_base: String,
    pub llm_path: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout: Duration,
    pub llm_temperature: f32,

    pub breaker_window: usize,
    pub breaker_min_calls: usize,
    pub breaker_failure_rate: f32,
    pub breaker_open_for: Duration,
    pub breaker_half_open_calls: usize,
    pub ask_timeout: Duration,

    pub startup_ingest_docs: bool,
    pub startup_ingest_traces: bool,
    pub startup_traces_lookback: String,
    pub startup_traces_limit: usize,
    pub startup_trace_delay: Duration,
    pub trace_polling_enabled: bool,
    pub trace_polling_interval: Duration,
    pub trace_polling_initial_delay: Duration,
    pub trace_polling_lookback: String,
    pub trace_polling_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_root = env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home).join(".local/share"));

        Self {
            http_addr: "127.0.0.1:8080".to_string(),
            db_path: data_root.join("triage/index.duckdb"),
            docs_path: PathBuf::from("docs"),
            known_services: DEFAULT_KNOWN_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),

            jaeger_api_url: "http://127.0.0.1:16686".to_string(),
            jaeger_timeout: Duration::from_secs(10),
            source_max_retries: 2,
            source_retry_delay: Duration::from_secs(1),
            batch_max_attempts: 3,
            batch_backoff: Duration::from_secs(2),

            embedding_api_base: "http://127.0.0.1:11434".to_string(),
            embedding_path: "/v1/embeddings".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_api_key: None,
            embedding_timeout: Duration::from_secs(30),

            llm_api_base: "http://127.0.0.1:11434".to_string(),
            llm_path: "/v1/chat/completions".to_string(),
            llm_model: "llama3.2".to_string(),
            llm_api_key: None,
            llm_timeout: Duration::from_secs(45),
            llm_temperature: 0.2,

            breaker_window: 10,
            breaker_min_calls: 5,
            breaker_failure_rate: 0.5,
            breaker_open_for: Duration::from_secs(30),
            breaker_half_open_calls: 3,
            ask_timeout: Duration::from_secs(60),

            startup_ingest_docs: true,
            startup_ingest_traces: true,
            startup_traces_lookback: "1h".to_string(),
            startup_traces_limit: 50,
            startup_trace_delay: Duration::from_secs(5),
            trace_polling_enabled: true,
            trace_polling_interval: Duration::from_secs(300),
            trace_polling_initial_delay: Duration::from_secs(60),
            trace_polling_lookback: "10m".to_string(),
            trace_polling_limit: 20,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        let env_overrides = load_env_overrides()?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.breaker_failure_rate) || self.breaker_failure_rate == 0.0 {
            return Err(TriageError::Config(format!(
                "breaker_failure_rate must be in (0, 1], got {}",
                self.breaker_failure_rate
            )));
        }
        if self.breaker_window == 0 || self.breaker_half_open_calls == 0 {
            return Err(TriageError::Config(
                "breaker_window and breaker_half_open_calls must be positive".to_string(),
            ));
        }
        if self.breaker_min_calls > self.breaker_window {
            return Err(TriageError::Config(format!(
                "breaker_min_calls ({}) must not exceed breaker_window ({})",
                self.breaker_min_calls, self.breaker_window
            )));
        }
        if self.batch_max_attempts == 0 {
            return Err(TriageError::Config(
                "batch_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.trace_polling_interval.is_zero() {
            return Err(TriageError::Config(
                "trace_polling_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    http_addr: Option<String>,
    db_path: Option<PathBuf>,
    docs_path: Option<PathBuf>,
    known_services: Option<Vec<String>>,
    jaeger_api_url: Option<String>,
    jaeger_timeout: Option<String>,
    source_max_retries: Option<u32>,
    source_retry_delay: Option<String>,
    batch_max_attempts: Option<u32>,
    batch_backoff: Option<String>,
    embedding_api_base: Option<String>,
    embedding_path: Option<String>,
    embedding_model: Option<String>,
    embedding_api_key: Option<String>,
    embedding_timeout: Option<String>,
    llm_api_base: Option<String>,
    llm_path: Option<String>,
    llm_model: Option<String>,
    llm_api_key: Option<String>,
    llm_timeout: Option<String>,
    llm_temperature: Option<f32>,
    breaker_window: Option<usize>,
    breaker_min_calls: Option<usize>,
    breaker_failure_rate: Option<f32>,
    breaker_open_for: Option<String>,
    breaker_half_open_calls: Option<usize>,
    ask_timeout: Option<String>,
    startup_ingest_docs: Option<bool>,
    startup_ingest_traces: Option<bool>,
    startup_traces_lookback: Option<String>,
    startup_traces_limit: Option<usize>,
    startup_trace_delay: Option<String>,
    trace_polling_enabled: Option<bool>,
    trace_polling_interval: Option<String>,
    trace_polling_initial_delay: Option<String>,
    trace_polling_lookback: Option<String>,
    trace_polling_limit: Option<usize>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("TRIAGE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("triage/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| TriageError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| TriageError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TriageError::Config(format!("bad {name} in environment: {e}"))),
        Err(_) => Ok(None),
    }
}

fn load_env_overrides() -> Result<ConfigOverrides> {
    Ok(ConfigOverrides {
        http_addr: env::var("TRIAGE_HTTP_ADDR").ok(),
        db_path: env::var("TRIAGE_DB_PATH").ok().map(PathBuf::from),
        docs_path: env::var("TRIAGE_DOCS_PATH").ok().map(PathBuf::from),
        known_services: env::var("TRIAGE_KNOWN_SERVICES")
            .ok()
            .map(|v| parse_service_list(&v)),
        jaeger_api_url: env::var("TRIAGE_JAEGER_API_URL").ok(),
        jaeger_timeout: env::var("TRIAGE_JAEGER_TIMEOUT").ok(),
        source_max_retries: env_parsed("TRIAGE_SOURCE_MAX_RETRIES")?,
        source_retry_delay: env::var("TRIAGE_SOURCE_RETRY_DELAY").ok(),
        batch_max_attempts: env_parsed("TRIAGE_BATCH_MAX_ATTEMPTS")?,
        batch_backoff: env::var("TRIAGE_BATCH_BACKOFF").ok(),
        embedding_api_base: env::var("TRIAGE_EMBEDDING_API_BASE").ok(),
        embedding_path: env::var("TRIAGE_EMBEDDING_PATH").ok(),
        embedding_model: env::var("TRIAGE_EMBEDDING_MODEL").ok(),
        embedding_api_key: env::var("TRIAGE_EMBEDDING_API_KEY").ok(),
        embedding_timeout: env::var("TRIAGE_EMBEDDING_TIMEOUT").ok(),
        llm_api_base: env::var("TRIAGE_LLM_API_BASE").ok(),
        llm_path: env::var("TRIAGE_LLM_PATH").ok(),
        llm_model: env::var("TRIAGE_LLM_MODEL").ok(),
        llm_api_key: env::var("TRIAGE_LLM_API_KEY").ok(),
        llm_timeout: env::var("TRIAGE_LLM_TIMEOUT").ok(),
        llm_temperature: env_parsed("TRIAGE_LLM_TEMPERATURE")?,
        breaker_window: env_parsed("TRIAGE_BREAKER_WINDOW")?,
        breaker_min_calls: env_parsed("TRIAGE_BREAKER_MIN_CALLS")?,
        breaker_failure_rate: env_parsed("TRIAGE_BREAKER_FAILURE_RATE")?,
        breaker_open_for: env::var("TRIAGE_BREAKER_OPEN_FOR").ok(),
        breaker_half_open_calls: env_parsed("TRIAGE_BREAKER_HALF_OPEN_CALLS")?,
        ask_timeout: env::var("TRIAGE_ASK_TIMEOUT").ok(),
        startup_ingest_docs: env_parsed("TRIAGE_STARTUP_INGEST_DOCS")?,
        startup_ingest_traces: env_parsed("TRIAGE_STARTUP_INGEST_TRACES")?,
        startup_traces_lookback: env::var("TRIAGE_STARTUP_TRACES_LOOKBACK").ok(),
        startup_traces_limit: env_parsed("TRIAGE_STARTUP_TRACES_LIMIT")?,
        startup_trace_delay: env::var("TRIAGE_STARTUP_TRACE_DELAY").ok(),
        trace_polling_enabled: env_parsed("TRIAGE_TRACE_POLLING_ENABLED")?,
        trace_polling_interval: env::var("TRIAGE_TRACE_POLLING_INTERVAL").ok(),
        trace_polling_initial_delay: env::var("TRIAGE_TRACE_POLLING_INITIAL_DELAY").ok(),
        trace_polling_lookback: env::var("TRIAGE_TRACE_POLLING_LOOKBACK").ok(),
        trace_polling_limit: env_parsed("TRIAGE_TRACE_POLLING_LIMIT")?,
    })
}

fn parse_duration_field(name: &str, value: &str, source: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        TriageError::Config(format!("bad {name} in {source}: {e} (value={value})"))
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    macro_rules! set {
        ($field:ident) => {
            if let Some(v) = overrides.$field {
                cfg.$field = v;
            }
        };
    }
    macro_rules! set_duration {
        ($field:ident) => {
            if let Some(v) = overrides.$field {
                cfg.$field = parse_duration_field(stringify!($field), &v, source)?;
            }
        };
    }

    set!(http_addr);
    set!(db_path);
    set!(docs_path);
    set!(known_services);
    set!(jaeger_api_url);
    set_duration!(jaeger_timeout);
    set!(source_max_retries);
    set_duration!(source_retry_delay);
    set!(batch_max_attempts);
    set_duration!(batch_backoff);
    set!(embedding_api_base);
    set!(embedding_path);
    set!(embedding_model);
    if let Some(v) = overrides.embedding_api_key {
        cfg.embedding_api_key = Some(v);
    }
    set_duration!(embedding_timeout);
    set!(llm_api_base);
    set!(llm_path);
    set!(llm_model);
    if let Some(v) = overrides.llm_api_key {
        cfg.llm_api_key = Some(v);
    }
    set_duration!(llm_timeout);
    set!(llm_temperature);
    set!(breaker_window);
    set!(breaker_min_calls);
    set!(breaker_failure_rate);
    set_duration!(breaker_open_for);
    set!(breaker_half_open_calls);
    set_duration!(ask_timeout);
    set!(startup_ingest_docs);
    set!(startup_ingest_traces);
    set!(startup_traces_lookback);
    set!(startup_traces_limit);
    set_duration!(startup_trace_delay);
    set!(trace_polling_enabled);
    set_duration!(trace_polling_interval);
    set_duration!(trace_polling_initial_delay);
    set!(trace_polling_lookback);
    set!(trace_polling_limit);
    Ok(())
}

fn parse_service_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}
