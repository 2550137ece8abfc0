//! Shape arithmetic shared by the tensor ops.

use crate::error::{TensorError, TensorResult};

/// Total number of elements for the given dimensions (1 for a scalar).
pub fn numel(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Resulting shape of broadcasting `a` against `b` (NumPy rules).
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> TensorResult<Vec<usize>> {
    let max_ndim = a.len().max(b.len());
    let mut result = vec![0usize; max_ndim];

    for i in 0..max_ndim {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };

        result[max_ndim - 1 - i] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(TensorError::BroadcastError {
                a: a.to_vec(),
                b: b.to_vec(),
            });
        };
    }

    Ok(result)
}

/// Check that `axes` is a permutation of `0..ndim`.
pub fn check_permutation(axes: &[usize], ndim: usize) -> TensorResult<()> {
    if axes.len() != ndim {
        return Err(TensorError::InvalidOperation(format!(
            "permutation {:?} does not cover {} axes",
            axes, ndim
        )));
    }
    let mut seen = vec![false; ndim];
    for &axis in axes {
        if axis >= ndim {
            return Err(TensorError::InvalidAxis { axis, ndim });
        }
        if seen[axis] {
            return Err(TensorError::InvalidOperation(format!(
                "axis {} repeated in permutation {:?}",
                axis, axes
            )));
        }
        seen[axis] = true;
    }
    Ok(())
}
