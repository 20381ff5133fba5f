//! Small strided GEMM kernel.
//!
//! One safe triple-loop implementation shared by `Matrix::multiply` and the dense
//! backward pass. Strides let callers read an operand transposed without
//! materializing the transpose.

/// Computes `c = alpha * a·b + beta * c` for row-major buffers with explicit strides.
///
/// `a` is `m × k`, `b` is `k × n`, `c` is `m × n`. `rs*` / `cs*` are row and column
/// strides. Bounds are validated by callers.
#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f64(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    rsa: usize,
    csa: usize,
    b: &[f64],
    rsb: usize,
    csb: usize,
    beta: f64,
    c: &mut [f64],
    rsc: usize,
    csc: usize,
) {
    debug_assert!(rsa > 0 || m <= 1);
    debug_assert!(csa > 0 || k <= 1);
    debug_assert!(rsb > 0 || k <= 1);
    debug_assert!(csb > 0 || n <= 1);
    debug_assert!(rsc > 0 || m <= 1);
    debug_assert!(csc > 0 || n <= 1);

    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f64;
            let a0 = i * rsa;
            let b0 = j * csb;

            for p in 0..k {
                acc += a[a0 + p * csa] * b[p * rsb + b0];
            }

            let idx = i * rsc + j * csc;
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}
