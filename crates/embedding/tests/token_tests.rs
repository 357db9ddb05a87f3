use candle_core::{DType, Device, Result, Tensor};
use embedding::token::{TokenEmbedding, TokenEmbeddingConfig};

fn make_ids(data: &[i64], shape: (usize, usize)) -> Result<Tensor> {
    Tensor::from_slice(data, shape, &Device::Cpu)
}

fn config(vocab_size: usize, hidden_dim: usize, trainable: bool, dtype: DType) -> TokenEmbeddingConfig {
    TokenEmbeddingConfig {
        vocab_size,
        hidden_dim,
        trainable,
        dtype,
        device: Device::Cpu,
    }
}

#[test]
fn forward_shape_and_dtype_match_config() -> Result<()> {
    let config = config(8, 4, true, DType::F16);
    let embedding = TokenEmbedding::new(config.clone())?;
    let token_ids = make_ids(&[0, 1, 2, 3], (2, 2))?;

    let output = embedding.forward(&token_ids)?;

    assert_eq!(output.dims(), &[2, 2, config.hidden_dim]);
    assert_eq!(output.dtype(), config.dtype);
    Ok(())
}

#[test]
fn forward_rejects_out_of_range_ids() -> Result<()> {
    let embedding = TokenEmbedding::new(config(4, 3, true, DType::F32))?;
    let token_ids = make_ids(&[0, 4], (1, 2))?;

    let err = embedding.forward(&token_ids).unwrap_err();
    assert!(err.to_string().contains("token id 4 exceeds vocab size"));

    let negative = make_ids(&[-1, 0], (1, 2))?;
    assert!(embedding.forward(&negative).is_err());
    Ok(())
}

#[test]
fn forward_rejects_float_ids() -> Result<()> {
    let embedding = TokenEmbedding::new(config(4, 3, true, DType::F32))?;
    let ids = Tensor::from_slice(&[0f32, 1.0], (1, 2), &Device::Cpu)?;
    assert!(embedding.forward(&ids).is_err());
    Ok(())
}

#[test]
fn pretrained_rows_are_returned_verbatim() -> Result<()> {
    let matrix = Tensor::from_slice(
        &[0f32, 0.0, 1.0, 1.0, 2.0, 2.0],
        (3, 2),
        &Device::Cpu,
    )?;
    let embedding = TokenEmbedding::from_pretrained(&matrix, false, DType::F32, &Device::Cpu)?;
    assert_eq!(embedding.config().vocab_size, 3);

    let ids = make_ids(&[2, 0, 1], (1, 3))?;
    let rows = embedding.forward(&ids)?.squeeze(0)?.to_vec2::<f32>()?;
    assert_eq!(rows, vec![vec![2.0, 2.0], vec![0.0, 0.0], vec![1.0, 1.0]]);
    Ok(())
}

#[test]
fn frozen_tables_expose_no_parameters() -> Result<()> {
    let frozen = TokenEmbedding::new(config(5, 2, false, DType::F32))?;
    assert!(!frozen.is_trainable());
    assert!(frozen.named_parameters("word").is_empty());

    let trainable = TokenEmbedding::new(config(5, 2, true, DType::F32))?;
    let params = trainable.named_parameters("word");
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].0, "word.weight");
    Ok(())
}

#[test]
fn frozen_tables_do_not_receive_gradients() -> Result<()> {
    let frozen = TokenEmbedding::new(config(5, 2, false, DType::F32))?;
    let ids = make_ids(&[1, 3], (1, 2))?;
    let loss = frozen.forward(&ids)?.sum_all()?;
    let grads = loss.backward()?;
    assert!(grads.get(&frozen.weight()).is_none());
    Ok(())
}
