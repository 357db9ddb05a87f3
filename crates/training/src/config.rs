use model::IanConfig;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

/// Everything `ian-train` needs: model hyper-parameters, data, optimizer and runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub model: IanConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl TrainingConfig {
    /// Loads a TOML or JSON config; relative paths resolve against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config: TrainingConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | Some("tml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(TrainingError::ConfigFormat(format!(
                    "unsupported configuration extension '{}'",
                    other
                )));
            }
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.apply_base_path(base_dir);
        config.validate()?;

        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TrainingError> {
        Self::from_path(path)
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), TrainingError> {
        let mut errors = Vec::new();

        if let Err(err) = self.model.validate() {
            errors.push(format!("model: {err}"));
        }

        if self.data.train.as_os_str().is_empty() {
            errors.push("data.train must not be empty".to_string());
        }

        if self.data.batch_size == 0 {
            errors.push("data.batch_size must be greater than 0".to_string());
        }

        if self.optimizer.learning_rate <= 0.0 {
            errors.push("optimizer.learning_rate must be greater than 0".to_string());
        }

        if self.optimizer.weight_decay < 0.0 {
            errors.push("optimizer.weight_decay must be >= 0".to_string());
        }

        if !(0.0 < self.optimizer.beta1 && self.optimizer.beta1 < 1.0) {
            errors.push("optimizer.beta1 must be in (0, 1)".to_string());
        }

        if !(0.0 < self.optimizer.beta2 && self.optimizer.beta2 < 1.0) {
            errors.push("optimizer.beta2 must be in (0, 1)".to_string());
        }

        if self.optimizer.epsilon <= 0.0 {
            errors.push("optimizer.epsilon must be greater than 0".to_string());
        }

        if self.runtime.epochs == 0 {
            errors.push("runtime.epochs must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.runtime.threshold) {
            errors.push("runtime.threshold must be in [0, 1]".to_string());
        }

        if DeviceChoice::parse(&self.runtime.device).is_none() {
            errors.push(format!(
                "runtime.device must be one of auto, cpu, cuda[:N], metal[:N] (got '{}')",
                self.runtime.device
            ));
        }

        if !errors.is_empty() {
            return Err(TrainingError::validation(errors));
        }

        Ok(())
    }

    fn apply_base_path(&mut self, base: &Path) {
        self.data.apply_base_path(base);
        self.runtime.apply_base_path(base);
    }
}

/// Pair files are CSVs with header `qid1,qid2,q1,q2[,label]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub train: PathBuf,
    #[serde(default)]
    pub validation: Option<PathBuf>,
    #[serde(default)]
    pub test: Option<PathBuf>,
    /// `.npy` matrix of shape `(vocab, dim)`.
    #[serde(default)]
    pub word_embeddings: Option<PathBuf>,
    #[serde(default)]
    pub char_embeddings: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub shuffle: bool,
}

impl DataConfig {
    fn apply_base_path(&mut self, base: &Path) {
        absolutize_in_place(&mut self.train, base);
        for path in [
            self.validation.as_mut(),
            self.test.as_mut(),
            self.word_embeddings.as_mut(),
            self.char_embeddings.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            absolutize_in_place(path, base);
        }
    }
}

/// AdamW hyper-parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub weight_decay: f64,
    #[serde(default = "default_beta1")]
    pub beta1: f64,
    #[serde(default = "default_beta2")]
    pub beta2: f64,
    #[serde(default = "default_adam_eps")]
    pub epsilon: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            weight_decay: 0.0,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_adam_eps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// `auto`, `cpu`, `cuda[:N]` or `metal[:N]`.
    #[serde(default = "default_device")]
    pub device: String,
    /// Score above which a pair counts as a match.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Directory receiving `<type>_logs.log` evaluation reports.
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub progress: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            epochs: default_epochs(),
            device: default_device(),
            threshold: default_threshold(),
            save_dir: None,
            progress: true,
        }
    }
}

impl RuntimeConfig {
    fn apply_base_path(&mut self, base: &Path) {
        if let Some(dir) = self.save_dir.as_mut() {
            absolutize_in_place(dir, base);
        }
    }
}

/// Parsed form of [`RuntimeConfig::device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChoice {
    Auto,
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl DeviceChoice {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let (kind, ordinal) = match value.split_once(':') {
            Some((kind, idx)) => (kind.to_string(), Some(idx.parse::<usize>().ok()?)),
            None => (value, None),
        };
        match (kind.as_str(), ordinal) {
            ("auto", None) => Some(Self::Auto),
            ("cpu", None) => Some(Self::Cpu),
            ("cuda", idx) => Some(Self::Cuda(idx.unwrap_or(0))),
            ("metal", idx) => Some(Self::Metal(idx.unwrap_or(0))),
            _ => None,
        }
    }
}

fn absolutize_in_place(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn default_batch_size() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_adam_eps() -> f64 {
    1e-8
}

fn default_seed() -> u64 {
    42
}

fn default_epochs() -> usize {
    10
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_threshold() -> f32 {
    0.5
}

#[derive(Debug)]
pub enum TrainingError {
    Io(std::io::Error),
    ConfigFormat(String),
    Validation(Vec<String>),
    Initialization(String),
    Runtime(String),
}

impl TrainingError {
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    pub fn validation(messages: Vec<String>) -> Self {
        Self::Validation(messages)
    }
}

impl fmt::Display for TrainingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingError::Io(err) => write!(f, "i/o error: {}", err),
            TrainingError::ConfigFormat(err) => write!(f, "failed to parse config: {}", err),
            TrainingError::Validation(messages) => {
                write!(f, "invalid configuration: {}", messages.join("; "))
            }
            TrainingError::Initialization(msg) => {
                write!(f, "trainer initialization failed: {}", msg)
            }
            TrainingError::Runtime(msg) => write!(f, "training failed: {}", msg),
        }
    }
}

impl std::error::Error for TrainingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrainingError::Io(err) => Some(err),
            TrainingError::ConfigFormat(_)
            | TrainingError::Validation(_)
            | TrainingError::Initialization(_)
            | TrainingError::Runtime(_) => None,
        }
    }
}

impl From<std::io::Error> for TrainingError {
    fn from(value: std::io::Error) -> Self {
        TrainingError::Io(value)
    }
}

impl From<toml::de::Error> for TrainingError {
    fn from(value: toml::de::Error) -> Self {
        TrainingError::ConfigFormat(value.to_string())
    }
}

impl From<serde_json::Error> for TrainingError {
    fn from(value: serde_json::Error) -> Self {
        TrainingError::ConfigFormat(value.to_string())
    }
}

impl From<candle_core::Error> for TrainingError {
    fn from(value: candle_core::Error) -> Self {
        TrainingError::Runtime(value.to_string())
    }
}

impl From<model::ModelError> for TrainingError {
    fn from(value: model::ModelError) -> Self {
        match value {
            model::ModelError::Config(err) => TrainingError::Initialization(err.to_string()),
            other => TrainingError::Runtime(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_devices() {
        assert_eq!(DeviceChoice::parse("CPU"), Some(DeviceChoice::Cpu));
        assert_eq!(DeviceChoice::parse("cuda:1"), Some(DeviceChoice::Cuda(1)));
        assert_eq!(DeviceChoice::parse("metal"), Some(DeviceChoice::Metal(0)));
        assert_eq!(DeviceChoice::parse("cpu:0"), None);
        assert_eq!(DeviceChoice::parse("tpu"), None);
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut config: TrainingConfig = toml::from_str(
            r#"
            [data]
            train = "train.csv"
            batch_size = 0

            [optimizer]
            learning_rate = 0.0
            "#,
        )
        .unwrap();
        config.model.word_vocab_size = 10;
        match config.validate() {
            Err(TrainingError::Validation(messages)) => {
                assert_eq!(messages.len(), 2, "{messages:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
