//! Explicit symplectic schemes for separable Hamiltonians.
//!
//! A scheme is a sequence of `(c_j, d_j)` pairs. Each sub-stage drifts the
//! positions with weight `c_j` and then kicks the momenta with weight `d_j`,
//! the kick using the freshly drifted positions:
//!
//! ```text
//! q <- q + c_j h dH/dp(q, p)
//! p <- p - d_j h dH/dq(q, p)
//! ```
//!
//! States are laid out as `[q_1..q_n, p_1..p_n]`.

use crate::error::{ConfigurationError, Result};
use crate::fixed_step::{propagate, propagate_history};
use crate::traits::{
    check_dimension, Hamiltonian, Integrator, MixedVariableHamiltonian, Scalar, StepAdvancer,
};
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Stage ordering of the second-order leapfrog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOrdering {
    /// Half drift, full kick, half drift.
    DriftKickDrift,
    /// Half kick, full drift, half kick.
    KickDriftKick,
}

/// Drift/kick weights of a composition scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymplecticScheme {
    name: String,
    order: u32,
    drift: Vec<f64>,
    kick: Vec<f64>,
}

impl SymplecticScheme {
    /// Custom composition. Both weight arrays must be non-empty and of equal
    /// length.
    pub fn new(name: &str, order: u32, drift: Vec<f64>, kick: Vec<f64>) -> Result<Self> {
        if drift.is_empty()
            || drift.len() != kick.len()
            || drift.iter().chain(kick.iter()).any(|w| !w.is_finite())
        {
            return Err(ConfigurationError::InvalidCoefficients {
                scheme: name.to_string(),
            }
            .into());
        }
        Ok(Self {
            name: name.to_string(),
            order,
            drift,
            kick,
        })
    }

    /// Symplectic Euler, first order.
    pub fn euler() -> Self {
        Self::builtin("symplectic Euler", 1, vec![1.0], vec![1.0])
    }

    pub fn leapfrog(ordering: StageOrdering) -> Self {
        match ordering {
            StageOrdering::DriftKickDrift => {
                Self::builtin("leapfrog (drift-kick-drift)", 2, vec![0.5, 0.5], vec![1.0, 0.0])
            }
            StageOrdering::KickDriftKick => {
                Self::builtin("leapfrog (kick-drift-kick)", 2, vec![0.0, 1.0], vec![0.5, 0.5])
            }
        }
    }

    /// Forest-Ruth, fourth order.
    pub fn forest_ruth() -> Self {
        let cbrt2 = 2.0f64.cbrt();
        let w1 = 1.0 / (2.0 - cbrt2);
        let w0 = -cbrt2 / (2.0 - cbrt2);
        Self::builtin(
            "Forest-Ruth",
            4,
            vec![w1 / 2.0, (w0 + w1) / 2.0, (w0 + w1) / 2.0, w1 / 2.0],
            vec![w1, w0, w1, 0.0],
        )
    }

    /// Yoshida's sixth-order composition (solution A), eight sub-stages.
    pub fn yoshida6() -> Self {
        let w1 = -1.177_679_984_178_87;
        let w2 = 0.235_573_213_359_357;
        let w3 = 0.784_513_610_477_560;
        let w0 = 1.0 - 2.0 * (w1 + w2 + w3);
        Self::builtin(
            "Yoshida (6th order)",
            6,
            vec![
                w3 / 2.0,
                (w3 + w2) / 2.0,
                (w2 + w1) / 2.0,
                (w1 + w0) / 2.0,
                (w1 + w0) / 2.0,
                (w2 + w1) / 2.0,
                (w3 + w2) / 2.0,
                w3 / 2.0,
            ],
            vec![w3, w2, w1, w0, w1, w2, w3, 0.0],
        )
    }

    fn builtin(name: &str, order: u32, drift: Vec<f64>, kick: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            order,
            drift,
            kick,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn stages(&self) -> usize {
        self.drift.len()
    }

    fn weights(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.drift.iter().copied().zip(self.kick.iter().copied())
    }
}

fn require_separable<T: Scalar, H: Hamiltonian<T> + ?Sized>(
    hamiltonian: &H,
    scheme: &SymplecticScheme,
) -> Result<()> {
    if !hamiltonian.is_separable() {
        return Err(ConfigurationError::NonSeparable {
            scheme: scheme.name.clone(),
        }
        .into());
    }
    Ok(())
}

/// Composition scheme acting on canonical coordinates.
pub struct Symplectic<'a, T: Scalar, H: Hamiltonian<T> + ?Sized> {
    hamiltonian: &'a H,
    scheme: SymplecticScheme,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, H: Hamiltonian<T> + ?Sized> Symplectic<'a, T, H> {
    /// Fails with a configuration error if the Hamiltonian is not separable.
    pub fn new(hamiltonian: &'a H, scheme: SymplecticScheme) -> Result<Self> {
        require_separable(hamiltonian, &scheme)?;
        Ok(Self {
            hamiltonian,
            scheme,
            _scalar: PhantomData,
        })
    }

    pub fn leapfrog(hamiltonian: &'a H, ordering: StageOrdering) -> Result<Self> {
        Self::new(hamiltonian, SymplecticScheme::leapfrog(ordering))
    }

    pub fn scheme(&self) -> &SymplecticScheme {
        &self.scheme
    }
}

impl<'a, T: Scalar, H: Hamiltonian<T> + ?Sized> StepAdvancer<T> for Symplectic<'a, T, H> {
    fn dimension(&self) -> usize {
        2 * self.hamiltonian.degrees_of_freedom()
    }

    fn advance(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<()> {
        let n = self.hamiltonian.degrees_of_freedom();
        check_dimension(self.hamiltonian.name(), 2 * n, x.len())?;
        check_dimension(self.hamiltonian.name(), 2 * n, out.len())?;

        out.copy_from_slice(x);
        let (q, p) = out.split_at_mut(n);
        let mut grad = vec![T::zero(); n];

        // Zero weights are skipped so no gradient is wasted on them.
        for (c, d) in self.scheme.weights() {
            if c != 0.0 {
                self.hamiltonian.dh_dp(t, q, p, &mut grad)?;
                let drift = T::constant(c * h);
                for (qi, gi) in q.iter_mut().zip(&grad) {
                    *qi = *qi + drift * *gi;
                }
            }

            if d != 0.0 {
                self.hamiltonian.dh_dq(t, q, p, &mut grad)?;
                let kick = T::constant(d * h);
                for (pi, gi) in p.iter_mut().zip(&grad) {
                    *pi = *pi - kick * *gi;
                }
            }
        }
        Ok(())
    }
}

impl<'a, T: Scalar, H: Hamiltonian<T> + ?Sized> Integrator<T> for Symplectic<'a, T, H> {
    fn integrate(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>> {
        propagate(self, t0, tend, nsteps, x0)
    }

    fn integrate_history(
        &self,
        t0: f64,
        tend: f64,
        nsteps: usize,
        x0: &[T],
    ) -> Result<Trajectory<T>> {
        propagate_history(self, t0, tend, nsteps, x0)
    }
}

/// Composition scheme with drifts taken in mixed coordinates.
///
/// Each non-zero drift converts to `(q', p')`, advances `q'` along the
/// integrable part and converts back; kicks act on the original coordinates.
pub struct MixedVariableSymplectic<'a, T: Scalar, H: MixedVariableHamiltonian<T> + ?Sized> {
    hamiltonian: &'a H,
    scheme: SymplecticScheme,
    _scalar: PhantomData<T>,
}

impl<'a, T, H> MixedVariableSymplectic<'a, T, H>
where
    T: Scalar,
    H: MixedVariableHamiltonian<T> + ?Sized,
{
    pub fn new(hamiltonian: &'a H, scheme: SymplecticScheme) -> Result<Self> {
        require_separable(hamiltonian, &scheme)?;
        Ok(Self {
            hamiltonian,
            scheme,
            _scalar: PhantomData,
        })
    }

    /// Leapfrog in mixed variables.
    pub fn leapfrog(hamiltonian: &'a H, ordering: StageOrdering) -> Result<Self> {
        Self::new(hamiltonian, SymplecticScheme::leapfrog(ordering))
    }

    pub fn scheme(&self) -> &SymplecticScheme {
        &self.scheme
    }
}

impl<'a, T, H> StepAdvancer<T> for MixedVariableSymplectic<'a, T, H>
where
    T: Scalar,
    H: MixedVariableHamiltonian<T> + ?Sized,
{
    fn dimension(&self) -> usize {
        2 * self.hamiltonian.degrees_of_freedom()
    }

    fn advance(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<()> {
        let n = self.hamiltonian.degrees_of_freedom();
        check_dimension(self.hamiltonian.name(), 2 * n, x.len())?;
        check_dimension(self.hamiltonian.name(), 2 * n, out.len())?;

        let mut q = x[..n].to_vec();
        let mut p = x[n..].to_vec();
        let mut grad = vec![T::zero(); n];

        for (c, d) in self.scheme.weights() {
            if c != 0.0 {
                let (mut q_mixed, p_mixed) = self.hamiltonian.convert_to_mixed(&q, &p)?;
                self.hamiltonian.drift_dh_dp(t, &q_mixed, &p_mixed, &mut grad)?;
                let drift = T::constant(c * h);
                for (qi, gi) in q_mixed.iter_mut().zip(&grad) {
                    *qi = *qi + drift * *gi;
                }
                (q, p) = self.hamiltonian.convert_from_mixed(&q_mixed, &p_mixed)?;
            }

            if d != 0.0 {
                self.hamiltonian.kick_dh_dq(t, &q, &p, &mut grad)?;
                let kick = T::constant(d * h);
                for (pi, gi) in p.iter_mut().zip(&grad) {
                    *pi = *pi - kick * *gi;
                }
            }
        }

        out[..n].copy_from_slice(&q);
        out[n..].copy_from_slice(&p);
        Ok(())
    }
}

impl<'a, T, H> Integrator<T> for MixedVariableSymplectic<'a, T, H>
where
    T: Scalar,
    H: MixedVariableHamiltonian<T> + ?Sized,
{
    fn integrate(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>> {
        propagate(self, t0, tend, nsteps, x0)
    }

    fn integrate_history(
        &self,
        t0: f64,
        tend: f64,
        nsteps: usize,
        x0: &[T],
    ) -> Result<Trajectory<T>> {
        propagate_history(self, t0, tend, nsteps, x0)
    }
}
