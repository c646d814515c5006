//! Loss and evaluation over node subsets.
//!
//! Subsets are given as `u32` index tensors (see [`index_tensor`]), the
//! tensor form of a boolean node mask.

use candle_core::{DType, Device, Error, Result, Tensor, D};

/// Indices as a `u32` tensor for `index_select`. Fails on an index that
/// does not fit in `u32`.
pub fn index_tensor(indices: &[usize], device: &Device) -> Result<Tensor> {
    let idx = indices
        .iter()
        .map(|&i| {
            u32::try_from(i).map_err(|_| Error::Msg(format!("index {i} does not fit in u32")))
        })
        .collect::<Result<Vec<u32>>>()?;
    Tensor::from_vec(idx, indices.len(), device)
}

/// Labels as a `u32` tensor.
pub fn label_tensor(labels: &[usize], device: &Device) -> Result<Tensor> {
    index_tensor(labels, device)
}

/// Mean cross-entropy over the rows selected by `index`.
pub fn masked_cross_entropy(logits: &Tensor, labels: &Tensor, index: &Tensor) -> Result<Tensor> {
    let logits = logits.index_select(index, 0)?;
    let labels = labels.index_select(index, 0)?;
    candle_nn::loss::cross_entropy(&logits, &labels)
}

/// Fraction of selected rows whose argmax equals the label. 0 for an
/// empty selection.
pub fn accuracy(logits: &Tensor, labels: &Tensor, index: &Tensor) -> Result<f32> {
    if index.elem_count() == 0 {
        return Ok(0.0);
    }
    let pred = logits.index_select(index, 0)?.argmax(D::Minus1)?;
    let truth = labels.index_select(index, 0)?;
    pred.eq(&truth)?
        .to_dtype(DType::F32)?
        .mean_all()?
        .to_scalar::<f32>()
}

/// `matrix[true][pred]` counts over masked nodes.
pub fn confusion_matrix(
    pred: &[usize],
    labels: &[usize],
    mask: &[bool],
    num_classes: usize,
) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; num_classes]; num_classes];
    for ((&p, &t), _) in pred
        .iter()
        .zip(labels)
        .zip(mask)
        .filter(|&(_, &m)| m)
    {
        if p < num_classes && t < num_classes {
            matrix[t][p] += 1;
        }
    }
    matrix
}
