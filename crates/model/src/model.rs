use std::sync::OnceLock;

use attention::{
    masks::padding_mask_from_ids, Attention, Config as AttentionConfig, CrossSentenceFusion,
    SentenceVectorAttention,
};
use candle_core::{Tensor, Var};
use embedding::token::{TokenEmbedding, TokenEmbeddingConfig};
use layers::{
    recurrent::{BiGru, GruConfig},
    MultiPooling, PrecisionPolicy,
};

use crate::{
    config::{expect_width, ConfigError, IanConfig},
    head::ComparisonHead,
    ModelError,
};

/// Pre-trained embedding matrices, `(vocab_size, dim)`.
///
/// A missing matrix falls back to `N(0, 1)` initialisation with the sizes
/// from [`IanConfig`].
#[derive(Debug, Clone, Default)]
pub struct EmbeddingSources {
    pub word: Option<Tensor>,
    pub char: Option<Tensor>,
}

/// One batch of sentence pairs as `(batch, seq)` integer ids.
///
/// The two sentences may have different lengths.
#[derive(Debug, Clone)]
pub struct PairBatch {
    pub q1: Tensor,
    pub q2: Tensor,
    pub q1_char: Option<Tensor>,
    pub q2_char: Option<Tensor>,
}

impl PairBatch {
    /// Word-level batch without character ids.
    pub fn words(q1: Tensor, q2: Tensor) -> Self {
        Self {
            q1,
            q2,
            q1_char: None,
            q2_char: None,
        }
    }
}

/// Interactive attention-fusion network for sentence-pair matching.
///
/// Both sentences go through the same context encoder and the same
/// second-pass encoder; sentence-vector attention and fusion projections are
/// separate per direction.
#[derive(Debug, Clone)]
pub struct Ian {
    config: IanConfig,
    policy: PrecisionPolicy,
    attention_config: AttentionConfig,
    embedding: TokenEmbedding,
    embedding_scope: &'static str,
    context_encoder: BiGru,
    q1_attention: SentenceVectorAttention,
    q2_attention: SentenceVectorAttention,
    fuse_into_q1: CrossSentenceFusion,
    fuse_into_q2: CrossSentenceFusion,
    second_encoder: BiGru,
    pooling: MultiPooling,
    head: ComparisonHead,
    first_forward: OnceLock<()>,
}

impl Ian {
    pub fn new(config: IanConfig, sources: EmbeddingSources) -> Result<Self, ModelError> {
        config.validate()?;
        let dtype = config.precision.dtype();
        let device = config.device.clone();
        let policy = PrecisionPolicy::from_parameter_dtype(dtype);

        if config.word_level && config.char_level {
            log::warn!("word_level and char_level are both enabled; the encoder reads word embeddings only");
        }
        let (embedding, embedding_scope) = if config.word_level {
            let table = build_table(
                "word",
                sources.word.as_ref(),
                config.word_vocab_size,
                config.word_embedding_dim,
                config.word_trainable,
                &config,
            )?;
            (table, "word_embedding")
        } else {
            let table = build_table(
                "char",
                sources.char.as_ref(),
                config.char_vocab_size,
                config.char_embedding_dim,
                config.char_trainable,
                &config,
            )?;
            (table, "char_embedding")
        };
        let embed_dim = embedding.config().hidden_dim;

        let mut context_cfg = GruConfig::new(embed_dim, config.hidden_size);
        context_cfg.dropout = config.gru_dropout;
        context_cfg.recurrent_dropout = config.recurrent_dropout;
        let context_encoder = BiGru::new(context_cfg, &device, dtype, config.seed)?;
        let encoded = context_encoder.config().output_dim();
        expect_width("encoded sequence", config.encoded_dim(), "context encoder output", encoded)?;

        let q1_attention = SentenceVectorAttention::new(encoded, &device, dtype)?;
        let q2_attention = SentenceVectorAttention::new(encoded, &device, dtype)?;
        let fuse_into_q1 =
            CrossSentenceFusion::new(encoded, encoded, config.fusion_dim, &device, dtype)?;
        let fuse_into_q2 =
            CrossSentenceFusion::new(encoded, encoded, config.fusion_dim, &device, dtype)?;

        let mut second_cfg = GruConfig::new(fuse_into_q1.fusion_dim(), config.second_hidden_size);
        second_cfg.dropout = config.gru_dropout;
        second_cfg.recurrent_dropout = config.recurrent_dropout;
        let second_encoder =
            BiGru::new(second_cfg, &device, dtype, config.seed.wrapping_add(2))?;

        let pooling = MultiPooling::mean_max();
        let compare = second_encoder.config().output_dim() + fuse_into_q1.fusion_dim();
        expect_width("compare sequence", config.compare_dim(), "second pass + fusion", compare)?;
        let pooled = pooling.output_dim(compare);

        let head = ComparisonHead::new(
            pooled,
            &config.dense_units,
            config.head_dropout,
            config.seed.wrapping_add(4),
            &device,
            dtype,
        )?;
        expect_width("head input", config.head_input_dim(), "comparison features", head.input_dim())?;

        let attention_config = if config.mask_padding {
            AttentionConfig::masked()
        } else {
            AttentionConfig::default()
        };

        log::info!(
            "model::ian init embed={embed_dim} encoded={encoded} fusion={} compare={compare} pooled={pooled} head={:?} mask_padding={} dtype={dtype:?}",
            config.fusion_dim,
            config.dense_units,
            config.mask_padding,
        );

        Ok(Self {
            config,
            policy,
            attention_config,
            embedding,
            embedding_scope,
            context_encoder,
            q1_attention,
            q2_attention,
            fuse_into_q1,
            fuse_into_q2,
            second_encoder,
            pooling,
            head,
            first_forward: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &IanConfig {
        &self.config
    }

    /// Match probabilities shaped `(batch, 1)`.
    pub fn forward(&self, batch: &PairBatch, train: bool) -> Result<Tensor, ModelError> {
        let (ids1, ids2) = self.select_ids(batch)?;
        let (b1, _) = ids1.dims2()?;
        let (b2, _) = ids2.dims2()?;
        if b1 != b2 {
            return Err(ModelError::Input(format!(
                "q1 and q2 batch sizes differ: {b1} vs {b2}"
            )));
        }
        let policy = &self.policy;

        let emb1 = self.embedding.forward(ids1)?;
        let emb2 = self.embedding.forward(ids2)?;

        let enc1 = self.context_encoder.forward(&emb1, train, policy)?;
        let enc2 = self.context_encoder.forward(&emb2, train, policy)?;

        let (mask1, mask2) = if self.config.mask_padding {
            (
                Some(padding_mask_from_ids(ids1, self.config.pad_id)?),
                Some(padding_mask_from_ids(ids2, self.config.pad_id)?),
            )
        } else {
            (None, None)
        };
        let vec1 = self
            .q1_attention
            .attend(&enc1, mask1.as_ref(), &self.attention_config, policy)?
            .context;
        let vec2 = self
            .q2_attention
            .attend(&enc2, mask2.as_ref(), &self.attention_config, policy)?
            .context;

        let fused1 = self.fuse_into_q1.forward(&enc1, &vec2, policy)?;
        let fused2 = self.fuse_into_q2.forward(&enc2, &vec1, policy)?;

        let second1 = self.second_encoder.forward(&fused1, train, policy)?;
        let second2 = self.second_encoder.forward(&fused2, train, policy)?;

        let compare1 = Tensor::cat(&[&second1, &fused1], 2)?;
        let compare2 = Tensor::cat(&[&second2, &fused2], 2)?;
        let rep1 = self.pooling.forward(&compare1, policy)?;
        let rep2 = self.pooling.forward(&compare2, policy)?;

        let scores = self.head.forward(&rep1, &rep2, train, policy)?;

        if self.first_forward.set(()).is_ok() {
            log::debug!(
                "model::ian shapes emb={:?} enc={:?} vec={:?} fused={:?} compare={:?} rep={:?} scores={:?}",
                emb1.dims(),
                enc1.dims(),
                vec1.dims(),
                fused1.dims(),
                compare1.dims(),
                rep1.dims(),
                scores.dims()
            );
        }
        Ok(scores)
    }

    /// Trainable parameters with stable, scoped names.
    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let mut params = self.embedding.named_parameters(self.embedding_scope);
        params.extend(self.context_encoder.named_parameters("context_encoder"));
        params.extend(self.q1_attention.named_parameters("q1_attention"));
        params.extend(self.q2_attention.named_parameters("q2_attention"));
        params.extend(self.fuse_into_q1.named_parameters("fuse_into_q1"));
        params.extend(self.fuse_into_q2.named_parameters("fuse_into_q2"));
        params.extend(self.second_encoder.named_parameters("second_encoder"));
        params.extend(self.head.named_parameters("head"));
        params
    }

    /// Trainable parameters for the optimizer.
    pub fn parameters(&self) -> Vec<Var> {
        self.named_parameters()
            .into_iter()
            .map(|(_, var)| var)
            .collect()
    }

    fn select_ids<'a>(&self, batch: &'a PairBatch) -> Result<(&'a Tensor, &'a Tensor), ModelError> {
        if self.config.word_level {
            return Ok((&batch.q1, &batch.q2));
        }
        match (&batch.q1_char, &batch.q2_char) {
            (Some(q1), Some(q2)) => Ok((q1, q2)),
            _ => Err(ModelError::Input(
                "char-level model requires q1_char and q2_char".into(),
            )),
        }
    }
}

fn build_table(
    level: &'static str,
    matrix: Option<&Tensor>,
    vocab_size: usize,
    embedding_dim: usize,
    trainable: bool,
    config: &IanConfig,
) -> Result<TokenEmbedding, ModelError> {
    let dtype = config.precision.dtype();
    match matrix {
        Some(matrix) => {
            let table = TokenEmbedding::from_pretrained(matrix, trainable, dtype, &config.device)?;
            let found = table.config();
            if vocab_size != 0 {
                expect_width(
                    &format!("{level}_vocab_size"),
                    vocab_size,
                    &format!("{level} embedding matrix rows"),
                    found.vocab_size,
                )?;
            }
            if embedding_dim != 0 {
                expect_width(
                    &format!("{level}_embedding_dim"),
                    embedding_dim,
                    &format!("{level} embedding matrix columns"),
                    found.hidden_dim,
                )?;
            }
            Ok(table)
        }
        None => {
            if vocab_size == 0 || embedding_dim == 0 {
                return Err(ConfigError::InvalidValue {
                    field: if vocab_size == 0 {
                        "vocab_size"
                    } else {
                        "embedding_dim"
                    },
                    reason: format!(
                        "must be set for {level} embeddings when no pre-trained matrix is supplied"
                    ),
                }
                .into());
            }
            Ok(TokenEmbedding::new(TokenEmbeddingConfig {
                vocab_size,
                hidden_dim: embedding_dim,
                trainable,
                dtype,
                device: config.device.clone(),
            })?)
        }
    }
}
