//! Sentence attention feeding fusion, the way the matcher chains them.

use attention::{
    masks::padding_mask_from_ids, Attention, Config, CrossSentenceFusion, SentenceVectorAttention,
};
use candle_core::{DType, Device, Result, Tensor};
use layers::PrecisionPolicy;

fn to_candle(err: attention::AttentionError) -> candle_core::Error {
    candle_core::Error::Msg(err.to_string())
}

#[test]
fn sentence_vector_fuses_into_the_other_sentence() -> Result<()> {
    let device = Device::Cpu;
    let policy = PrecisionPolicy::default();
    let hidden = 6;

    let q1 = Tensor::randn(0f32, 1.0, (2, 5, hidden), &device)?;
    let q2 = Tensor::randn(0f32, 1.0, (2, 8, hidden), &device)?;

    let attention = SentenceVectorAttention::new(hidden, &device, DType::F32).map_err(to_candle)?;
    let fusion = CrossSentenceFusion::new(hidden, hidden, 4, &device, DType::F32).map_err(to_candle)?;

    let v1 = attention
        .attend(&q1, None, &Config::default(), &policy)
        .map_err(to_candle)?
        .context;
    let fused = fusion.forward(&q2, &v1, &policy).map_err(to_candle)?;
    assert_eq!(fused.dims(), &[2, 8, 4]);
    Ok(())
}

#[test]
fn fully_padded_rows_stay_finite() -> Result<()> {
    let device = Device::Cpu;
    let ids = Tensor::zeros((1, 4), DType::U32, &device)?;
    let mask = padding_mask_from_ids(&ids, 0)?;
    let sequence = Tensor::randn(0f32, 1.0, (1, 4, 3), &device)?;
    let attention = SentenceVectorAttention::new(3, &device, DType::F32).map_err(to_candle)?;
    let out = attention
        .attend(&sequence, Some(&mask), &Config::masked(), &PrecisionPolicy::default())
        .map_err(to_candle)?;
    let weights = out.weights.flatten_all()?.to_vec1::<f32>()?;
    assert!(weights.iter().all(|w| w.is_finite()));
    let total: f32 = weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-5);
    Ok(())
}
