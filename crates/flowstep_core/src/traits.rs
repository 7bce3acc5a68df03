use crate::error::{Result, ValidationError};
use crate::events::{ControlledRun, EventPredicate};
use crate::trajectory::Trajectory;
use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as state components.
/// Must support basic arithmetic, debug printing, conversion from f64 and
/// a projection onto a real magnitude for error control.
///
/// Plain floats and the crate's [`Dual`](crate::autodiff::Dual) number both
/// qualify; any other `Float` type (e.g. a truncated polynomial) does too.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {
    /// Real magnitude used for step acceptance and event bracketing.
    fn magnitude(self) -> f64;

    /// Lifts an `f64` constant into the scalar type (NaN if unrepresentable).
    fn constant(value: f64) -> Self;
}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {
    fn magnitude(self) -> f64 {
        ToPrimitive::to_f64(&self.abs()).unwrap_or(f64::NAN)
    }

    fn constant(value: f64) -> Self {
        T::from_f64(value).unwrap_or_else(T::nan)
    }
}

/// A first-order system `dx/dt = f(t, x)`.
pub trait Dynamics<T: Scalar> {
    /// Human readable model name, used in error messages.
    fn name(&self) -> &str;

    /// Dimension of the state vector.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field without argument checks.
    /// t: current time
    /// state: current state
    /// out: buffer receiving dx/dt
    fn derivative(&self, t: f64, state: &[T], out: &mut [T]);

    /// Checked evaluation: rejects negative time and wrong-length buffers
    /// before anything is computed.
    fn evaluate(&self, t: f64, state: &[T], out: &mut [T]) -> Result<()> {
        check_time(self.name(), t)?;
        check_dimension(self.name(), self.dimension(), state.len())?;
        check_dimension(self.name(), self.dimension(), out.len())?;
        self.derivative(t, state, out);
        Ok(())
    }
}

/// A Hamiltonian system with `n` degrees of freedom. States are laid out as
/// `[q_1..q_n, p_1..p_n]`.
pub trait Hamiltonian<T: Scalar> {
    fn name(&self) -> &str;

    /// Number of generalized positions `n`.
    fn degrees_of_freedom(&self) -> usize;

    /// `true` when `H(q, p) = T(p) + V(q)`.
    fn is_separable(&self) -> bool;

    /// Unchecked `∂H/∂q`.
    fn grad_q(&self, t: f64, q: &[T], p: &[T], out: &mut [T]);

    /// Unchecked `∂H/∂p`.
    fn grad_p(&self, t: f64, q: &[T], p: &[T], out: &mut [T]);

    fn dh_dq(&self, t: f64, q: &[T], p: &[T], out: &mut [T]) -> Result<()> {
        self.check_canonical(t, q, p, out)?;
        self.grad_q(t, q, p, out);
        Ok(())
    }

    fn dh_dp(&self, t: f64, q: &[T], p: &[T], out: &mut [T]) -> Result<()> {
        self.check_canonical(t, q, p, out)?;
        self.grad_p(t, q, p, out);
        Ok(())
    }

    fn check_canonical(&self, t: f64, q: &[T], p: &[T], out: &[T]) -> Result<()> {
        let n = self.degrees_of_freedom();
        check_time(self.name(), t)?;
        check_dimension(self.name(), n, q.len())?;
        check_dimension(self.name(), n, p.len())?;
        check_dimension(self.name(), n, out.len())
    }
}

/// A Hamiltonian `H = H0 + H1` where `H0` is simple in a second set of
/// canonical coordinates `(q', p')` and `H1` depends on `q` only.
///
/// Drifts are taken with `H0` in mixed coordinates, kicks with `H1` in the
/// original ones. `to_mixed` and `from_mixed` must be mutual inverses.
pub trait MixedVariableHamiltonian<T: Scalar>: Hamiltonian<T> {
    /// Unchecked `∂H0/∂p'` evaluated in mixed coordinates.
    fn drift_gradient(&self, t: f64, q_mixed: &[T], p_mixed: &[T], out: &mut [T]);

    /// Unchecked `∂H1/∂q` evaluated in original coordinates.
    fn kick_gradient(&self, t: f64, q: &[T], p: &[T], out: &mut [T]);

    /// `(q, p) -> (q', p')`
    fn to_mixed(&self, q: &[T], p: &[T], q_mixed: &mut [T], p_mixed: &mut [T]);

    /// `(q', p') -> (q, p)`
    fn from_mixed(&self, q_mixed: &[T], p_mixed: &[T], q: &mut [T], p: &mut [T]);

    fn drift_dh_dp(&self, t: f64, q_mixed: &[T], p_mixed: &[T], out: &mut [T]) -> Result<()> {
        self.check_canonical(t, q_mixed, p_mixed, out)?;
        self.drift_gradient(t, q_mixed, p_mixed, out);
        Ok(())
    }

    fn kick_dh_dq(&self, t: f64, q: &[T], p: &[T], out: &mut [T]) -> Result<()> {
        self.check_canonical(t, q, p, out)?;
        self.kick_gradient(t, q, p, out);
        Ok(())
    }

    /// Checked conversion into mixed coordinates.
    fn convert_to_mixed(&self, q: &[T], p: &[T]) -> Result<(Vec<T>, Vec<T>)> {
        let n = self.degrees_of_freedom();
        check_dimension(self.name(), n, q.len())?;
        check_dimension(self.name(), n, p.len())?;
        let mut q_mixed = vec![T::zero(); n];
        let mut p_mixed = vec![T::zero(); n];
        self.to_mixed(q, p, &mut q_mixed, &mut p_mixed);
        Ok((q_mixed, p_mixed))
    }

    /// Checked conversion back into original coordinates.
    fn convert_from_mixed(&self, q_mixed: &[T], p_mixed: &[T]) -> Result<(Vec<T>, Vec<T>)> {
        let n = self.degrees_of_freedom();
        check_dimension(self.name(), n, q_mixed.len())?;
        check_dimension(self.name(), n, p_mixed.len())?;
        let mut q = vec![T::zero(); n];
        let mut p = vec![T::zero(); n];
        self.from_mixed(q_mixed, p_mixed, &mut q, &mut p);
        Ok((q, p))
    }
}

/// A one-step scheme: advance the state by a single step of size `h`.
pub trait StepAdvancer<T: Scalar> {
    /// Dimension of the states this stepper accepts.
    fn dimension(&self) -> usize;

    /// x: state at time t
    /// out: buffer receiving the state at t + h
    fn advance(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<()>;
}

/// A one-step scheme that also reports a local error estimate.
pub trait ErrorEstimator<T: Scalar> {
    fn dimension(&self) -> usize;

    /// Order of the error estimate, used as the step-size controller exponent.
    fn control_order(&self) -> u32;

    /// Advances by `h` and returns the estimated local error.
    fn advance_with_error(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<T>;
}

/// Uniform entry points shared by every integrator.
pub trait Integrator<T: Scalar> {
    /// Propagates `x0` from `t0` to `tend` and returns the final state.
    /// For fixed-step schemes `nsteps` is exact, for adaptive ones it only
    /// seeds the initial step `(tend - t0) / nsteps`.
    fn integrate(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>>;

    /// Same as [`Integrator::integrate`] but records every post-step state.
    /// The initial state is not part of the trajectory.
    fn integrate_history(
        &self,
        t0: f64,
        tend: f64,
        nsteps: usize,
        x0: &[T],
    ) -> Result<Trajectory<T>>;
}

/// Integrators that can monitor an event predicate while propagating.
pub trait EventIntegrator<T: Scalar>: Integrator<T> {
    fn integrate_with_events<E>(
        &self,
        t0: f64,
        tend: f64,
        nsteps_hint: usize,
        x0: &[T],
        predicate: &E,
    ) -> Result<ControlledRun<T>>
    where
        E: EventPredicate<T> + ?Sized;
}

pub(crate) fn check_time(model: &str, t: f64) -> Result<()> {
    if !t.is_finite() {
        return Err(ValidationError::NonFiniteTime {
            model: model.to_string(),
            t,
        }
        .into());
    }
    if t < 0.0 {
        return Err(ValidationError::NegativeTime {
            model: model.to_string(),
            t,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn check_dimension(model: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ValidationError::DimensionMismatch {
            model: model.to_string(),
            expected,
            got,
        }
        .into());
    }
    Ok(())
}
