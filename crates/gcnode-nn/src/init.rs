//! Seeded parameter initialization.
//!
//! candle's CPU backend draws initial weights from an unseeded RNG, so a
//! freshly built model differs from run to run. [`seeded_init`] overwrites
//! every variable in a [`VarMap`] with values drawn from a seeded
//! `XorShiftRng`, visiting parameters in sorted-name order:
//!
//! - `*bias`: zeros
//! - everything else: Glorot uniform, `U(-a, a)` with `a = sqrt(6 / (fan_in + fan_out))`

use crate::{Error, Result};
use candle_core::Tensor;
use candle_nn::VarMap;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

/// Glorot/Xavier bound for a weight of the given shape.
///
/// candle stores linear weights as `(out, in)`; a 1-d parameter is treated
/// as a single fan.
pub fn glorot_bound(dims: &[usize]) -> f32 {
    let (fan_out, fan_in) = match dims {
        [] => (1, 1),
        [n] => (*n, 1),
        [out, inp, ..] => (*out, *inp),
    };
    (6.0 / (fan_in + fan_out) as f32).sqrt()
}

/// Re-initialize every variable in `varmap` from `seed`.
pub fn seeded_init(varmap: &VarMap, seed: u64) -> Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| Error::Training("parameter store lock poisoned".into()))?;

    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    let mut rng = XorShiftRng::seed_from_u64(seed);
    for name in names {
        let var = &vars[name];
        let dims = var.dims().to_vec();
        let count: usize = dims.iter().product();
        let values: Vec<f32> = if name.ends_with("bias") {
            vec![0.0; count]
        } else {
            let bound = glorot_bound(&dims);
            (0..count).map(|_| rng.gen_range(-bound..bound)).collect()
        };
        let init = Tensor::from_vec(values, dims, var.device())?.to_dtype(var.dtype())?;
        var.set(&init)?;
    }
    Ok(())
}
