//! Token embedding tables.

use candle_core::{bail, DType, Device, Error, Result, Tensor, Var};

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
    /// Whether the optimizer may update the table.
    pub trainable: bool,
    /// Storage dtype used for the underlying parameters and outputs.
    pub dtype: DType,
    /// Device hosting the parameters.
    pub device: Device,
}

#[derive(Debug, Clone)]
enum Table {
    Trainable(Var),
    Frozen(Tensor),
}

impl Table {
    fn tensor(&self) -> &Tensor {
        match self {
            Table::Trainable(var) => var.as_tensor(),
            Table::Frozen(tensor) => tensor,
        }
    }
}

/// Embedding table mapping `(batch, seq)` ids to `(batch, seq, hidden)` vectors.
///
/// Frozen tables are detached from the autograd graph and report no
/// parameters, so gradients never reach them.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    table: Table,
}

impl TokenEmbedding {
    /// Builds a new token embedding table and samples the parameters from `N(0, 1)`.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }
        let shape = (config.vocab_size, config.hidden_dim);
        let initial = Tensor::randn(0f32, 1f32, shape, &config.device)?.to_dtype(config.dtype)?;
        Self::with_table(config, initial)
    }

    /// Wraps a pre-trained `(vocab_size, hidden_dim)` matrix.
    ///
    /// The vocabulary size and width are taken from the matrix; the matrix is
    /// moved to `device` and cast to `dtype`.
    pub fn from_pretrained(
        matrix: &Tensor,
        trainable: bool,
        dtype: DType,
        device: &Device,
    ) -> Result<Self> {
        let (vocab_size, hidden_dim) = match matrix.dims() {
            [vocab, hidden] if *vocab > 0 && *hidden > 0 => (*vocab, *hidden),
            dims => bail!("pre-trained embedding must be a non-empty [vocab, hidden] matrix, got {dims:?}"),
        };
        if !matrix.dtype().is_float() {
            bail!(
                "pre-trained embedding expected a float matrix but received {:?}",
                matrix.dtype()
            );
        }
        let config = TokenEmbeddingConfig {
            vocab_size,
            hidden_dim,
            trainable,
            dtype,
            device: device.clone(),
        };
        let table = matrix.to_device(device)?.to_dtype(dtype)?;
        Self::with_table(config, table)
    }

    fn with_table(config: TokenEmbeddingConfig, table: Tensor) -> Result<Self> {
        let table = if config.trainable {
            Table::Trainable(Var::from_tensor(&table)?)
        } else {
            Table::Frozen(table.detach())
        };
        Ok(Self { config, table })
    }

    /// Returns the embedding configuration.
    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    pub fn is_trainable(&self) -> bool {
        matches!(self.table, Table::Trainable(_))
    }

    /// Returns a clone of the underlying weight tensor.
    pub fn weight(&self) -> Tensor {
        self.table.tensor().clone()
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs follow the
    /// `(batch, seq, hidden)` layout using the configured storage dtype.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = self.validate_token_ids(token_ids)?;

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        let gathered = self.table.tensor().index_select(&flat, 0)?;
        gathered.reshape((batch, seq, self.config.hidden_dim))
    }

    /// Trainable parameters under `scope`; empty for frozen tables.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let prefix = if scope.is_empty() { "embedding" } else { scope };
        match &self.table {
            Table::Trainable(var) => vec![(format!("{prefix}.weight"), var.clone())],
            Table::Frozen(_) => Vec::new(),
        }
    }

    fn validate_token_ids(&self, token_ids: &Tensor) -> Result<(usize, usize)> {
        let (batch, seq) = match token_ids.dims() {
            [batch, seq] if *batch > 0 && *seq > 0 => (*batch, *seq),
            [_, _] => {
                return Err(Error::Msg(
                    "token_ids must have non-zero batch and seq dimensions".into(),
                ))
            }
            _ => return Err(Error::Msg("token_ids must be shaped [batch, seq]".into())),
        };

        if !token_ids.dtype().is_int() {
            return Err(Error::Msg(format!(
                "token_ids expected integer dtype but received {:?}",
                token_ids.dtype()
            )));
        }
        Ok((batch, seq))
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(Error::Msg(format!(
                "encountered negative token id {min_id} (minimum)"
            )));
        }

        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            return Err(Error::Msg(format!(
                "token id {max_id} exceeds vocab size {vocab}"
            )));
        }
        Ok(())
    }
}
