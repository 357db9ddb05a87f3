use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use model::{ConfigError, EmbeddingSources, Ian, IanConfig, ModelError, PairBatch};

fn small_config() -> IanConfig {
    IanConfig {
        max_len: 8,
        word_vocab_size: 12,
        word_embedding_dim: 4,
        hidden_size: 3,
        fusion_dim: 5,
        second_hidden_size: 2,
        dense_units: vec![6, 3],
        seed: 7,
        ..IanConfig::default()
    }
}

fn ids(data: &[u32], shape: (usize, usize)) -> Result<Tensor> {
    Ok(Tensor::from_slice(data, shape, &Device::Cpu)?)
}

fn sample_batch() -> Result<PairBatch> {
    Ok(PairBatch::words(
        ids(&[1, 2, 3, 0, 0, 4, 5, 6, 7, 0], (2, 5))?,
        ids(&[3, 2, 1, 8, 9, 10, 11, 2, 0, 0, 0, 0, 5, 6], (2, 7))?,
    ))
}

#[test]
fn forward_scores_pairs_of_different_lengths() -> Result<()> {
    let model = Ian::new(small_config(), EmbeddingSources::default())?;
    let scores = model.forward(&sample_batch()?, false)?;

    assert_eq!(scores.dims(), &[2, 1]);
    assert_eq!(scores.dtype(), DType::F32);
    let values = scores.flatten_all()?.to_vec1::<f32>()?;
    assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    Ok(())
}

#[test]
fn inference_is_deterministic_and_training_is_not() -> Result<()> {
    let model = Ian::new(small_config(), EmbeddingSources::default())?;
    let batch = sample_batch()?;
    let a = model.forward(&batch, false)?;
    let b = model.forward(&batch, false)?;
    assert_eq!(a.to_vec2::<f32>()?, b.to_vec2::<f32>()?);

    let trained = model.forward(&batch, true)?;
    let gap = trained.sub(&a)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(gap > 0.0);
    Ok(())
}

#[test]
fn swapping_sentences_gives_valid_but_unequal_scores() -> Result<()> {
    let model = Ian::new(small_config(), EmbeddingSources::default())?;
    let batch = sample_batch()?;
    let swapped = PairBatch::words(batch.q2.clone(), batch.q1.clone());

    let forward = model.forward(&batch, false)?;
    let backward = model.forward(&swapped, false)?;
    for scores in [&forward, &backward] {
        assert_eq!(scores.dims(), &[2, 1]);
        let values = scores.flatten_all()?.to_vec1::<f32>()?;
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }
    // Each direction has its own fusion projection and sentence scorer, so
    // the score is not symmetric in its arguments.
    let gap = forward.sub(&backward)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(gap > 0.0);
    Ok(())
}

#[test]
fn frozen_pretrained_embeddings_are_not_parameters() -> Result<()> {
    let matrix = Tensor::randn(0f32, 1.0, (12, 4), &Device::Cpu)?;
    let sources = EmbeddingSources {
        word: Some(matrix),
        char: None,
    };
    let frozen = Ian::new(small_config(), sources.clone())?;
    assert!(frozen
        .named_parameters()
        .iter()
        .all(|(name, _)| !name.starts_with("word_embedding")));

    let mut config = small_config();
    config.word_trainable = true;
    let trainable = Ian::new(config, sources)?;
    assert_eq!(
        trainable.parameters().len(),
        frozen.parameters().len() + 1
    );
    Ok(())
}

#[test]
fn mismatched_embedding_matrix_is_a_config_error() -> Result<()> {
    let matrix = Tensor::randn(0f32, 1.0, (12, 6), &Device::Cpu)?;
    let sources = EmbeddingSources {
        word: Some(matrix),
        char: None,
    };
    let err = Ian::new(small_config(), sources).unwrap_err();
    match err {
        ModelError::Config(ConfigError::DimensionMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, 4);
            assert_eq!(found, 6);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn gradients_reach_every_stage() -> Result<()> {
    let mut config = small_config();
    config.word_trainable = true;
    let model = Ian::new(config, EmbeddingSources::default())?;
    let loss = model.forward(&sample_batch()?, true)?.sum_all()?;
    let grads = loss.backward()?;
    for (name, var) in model.named_parameters() {
        assert!(grads.get(var.as_tensor()).is_some(), "no gradient for {name}");
    }
    Ok(())
}

#[test]
fn masked_model_handles_fully_padded_rows() -> Result<()> {
    let mut config = small_config();
    config.mask_padding = true;
    let model = Ian::new(config, EmbeddingSources::default())?;
    let batch = PairBatch::words(ids(&[0, 0, 0, 1, 2, 3], (2, 3))?, ids(&[4, 5, 0, 0, 0, 0], (2, 3))?);
    let values = model.forward(&batch, false)?.flatten_all()?.to_vec1::<f32>()?;
    assert!(values.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn char_level_model_requires_char_ids() -> Result<()> {
    let mut config = small_config();
    config.word_level = false;
    config.char_level = true;
    config.char_vocab_size = 20;
    config.char_embedding_dim = 3;
    let model = Ian::new(config, EmbeddingSources::default())?;

    assert!(matches!(
        model.forward(&sample_batch()?, false),
        Err(ModelError::Input(_))
    ));

    let mut batch = sample_batch()?;
    batch.q1_char = Some(ids(&[1, 2, 3, 4, 19, 18], (2, 3))?);
    batch.q2_char = Some(ids(&[5, 6, 7, 8], (2, 2))?);
    assert_eq!(model.forward(&batch, false)?.dims(), &[2, 1]);
    Ok(())
}

#[test]
fn batch_size_mismatch_is_rejected() -> Result<()> {
    let model = Ian::new(small_config(), EmbeddingSources::default())?;
    let batch = PairBatch::words(ids(&[1, 2, 3], (1, 3))?, ids(&[1, 2, 3, 4], (2, 2))?);
    assert!(matches!(model.forward(&batch, false), Err(ModelError::Input(_))));
    Ok(())
}
