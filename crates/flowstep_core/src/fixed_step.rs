//! Shared driving loop for one-step schemes.
//!
//! Fixed-step schemes implement [`Integrator`](crate::traits::Integrator) by delegating to these
//! functions: the loop calls `advance` exactly `nsteps` times with
//! `h = (tend - t0) / nsteps`.

use crate::error::{DivergenceError, Result, ValidationError};
use crate::traits::{check_dimension, Scalar, StepAdvancer};
use crate::trajectory::Trajectory;

/// Propagates `x0` and returns the final state without storing history.
pub fn propagate<T, S>(stepper: &S, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>>
where
    T: Scalar,
    S: StepAdvancer<T> + ?Sized,
{
    let h = step_size(stepper.dimension(), t0, tend, nsteps, x0)?;

    let mut x = x0.to_vec();
    let mut next = x0.to_vec();
    let mut t = t0;
    for i in 0..nsteps {
        let t_next = advance_time(t0, h, i + 1, nsteps, tend);
        stepper.advance(t, t_next - t, &x, &mut next)?;
        check_finite(t_next, &next)?;
        std::mem::swap(&mut x, &mut next);
        t = t_next;
    }
    Ok(x)
}

/// Propagates `x0` recording the post-step state of every iteration.
pub fn propagate_history<T, S>(
    stepper: &S,
    t0: f64,
    tend: f64,
    nsteps: usize,
    x0: &[T],
) -> Result<Trajectory<T>>
where
    T: Scalar,
    S: StepAdvancer<T> + ?Sized,
{
    let h = step_size(stepper.dimension(), t0, tend, nsteps, x0)?;

    let mut history = Trajectory::with_capacity(nsteps);
    let mut x = x0.to_vec();
    let mut next = x0.to_vec();
    let mut t = t0;
    for i in 0..nsteps {
        let t_next = advance_time(t0, h, i + 1, nsteps, tend);
        stepper.advance(t, t_next - t, &x, &mut next)?;
        check_finite(t_next, &next)?;
        std::mem::swap(&mut x, &mut next);
        t = t_next;
        history.push(t, &x);
    }
    Ok(history)
}

fn step_size<T>(dim: usize, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<f64> {
    if nsteps == 0 {
        return Err(ValidationError::ZeroSteps.into());
    }
    check_dimension("integrator", dim, x0.len())?;
    Ok((tend - t0) / nsteps as f64)
}

/// Fails with a divergence once any component stops being finite.
pub(crate) fn check_finite<T: Scalar>(t: f64, x: &[T]) -> Result<()> {
    if x.iter().any(|v| !v.magnitude().is_finite()) {
        return Err(DivergenceError::NonFiniteState { t }.into());
    }
    Ok(())
}

// Times are recomputed from t0 instead of accumulated so the last sample
// lands exactly on tend; each step then spans exactly [t, t_next].
pub(crate) fn advance_time(t0: f64, h: f64, done: usize, nsteps: usize, tend: f64) -> f64 {
    if done == nsteps {
        tend
    } else {
        t0 + h * done as f64
    }
}
