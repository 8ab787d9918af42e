use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    /// Where to download the artifact from when it is not on disk yet.
    #[serde(default)]
    pub remote_url: Option<String>,
    pub input_width: u32,
    pub input_height: u32,
    /// Ordered exactly as the artifact was trained.
    pub class_names: Vec<String>,
    #[serde(default)]
    pub apply_softmax: bool,
    #[serde(default)]
    pub preload: bool,
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if self.onnx_file.trim().is_empty() {
            return Err("model.onnx_file must not be empty".to_string());
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(format!(
                "model input size must be non-zero, got {}x{}",
                self.input_width, self.input_height
            ));
        }
        if self.class_names.is_empty() {
            return Err("model.class_names must list at least one class".to_string());
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.class_names.iter().find(|name| !seen.insert(*name)) {
            return Err(format!("duplicate class name in model.class_names: {duplicate}"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub database_path: PathBuf,
    #[serde(default)]
    pub store_images: bool,
}

impl Validatable for HistoryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.database_path.as_os_str().is_empty() {
            return Err("history.database_path must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,
    #[serde(default = "default_report_images")]
    pub images: Vec<ReportImageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportImageConfig {
    pub file: String,
    pub caption: String,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_report_images() -> Vec<ReportImageConfig> {
    vec![
        ReportImageConfig {
            file: "training_accuracy.png".to_string(),
            caption: "Training Accuracy".to_string(),
        },
        ReportImageConfig {
            file: "training_loss.png".to_string(),
            caption: "Training Loss".to_string(),
        },
    ]
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            report_dir: default_report_dir(),
            images: default_report_images(),
        }
    }
}

impl Validatable for ReportsConfig {
    fn validate(&self) -> Result<(), String> {
        match self.images.iter().find(|image| image.file.trim().is_empty()) {
            Some(image) => Err(format!(
                "report image with caption `{}` has an empty file name",
                image.caption
            )),
            None => Ok(()),
        }
    }
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.model.validate()?;
        self.history.validate()?;
        self.reports.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {e}")))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("CITRUS")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate().map_err(config::ConfigError::Message)?;

    Ok(config)
}
