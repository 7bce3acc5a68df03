use crate::error::{ConfigurationError, DivergenceError, Result};
use crate::events::{drive, Attempt, ControlledRun, EventPredicate, EventSettings, NoEvents, StepPolicy};
use crate::traits::{
    check_dimension, Dynamics, ErrorEstimator, EventIntegrator, Integrator, Scalar,
};
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Largest single shrink applied to a rejected or accepted step.
const MIN_FACTOR: f64 = 0.1;

/// Error-control parameters for adaptive schemes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepControl {
    /// A step is accepted when its error estimate is at most this value.
    pub tolerance: f64,
    /// Maximum growth factor between consecutive steps.
    pub multiplier: f64,
    pub safety: f64,
    /// Absolute floor on the step; 0 leaves only the floating-point limit.
    pub min_step: f64,
}

impl Default for StepControl {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-7,
            multiplier: 5.0,
            safety: 0.9,
            min_step: 0.0,
        }
    }
}

impl StepControl {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigurationError::NonPositiveTolerance(self.tolerance).into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigurationError::InvalidMultiplier(self.multiplier).into());
        }
        if !self.safety.is_finite() || self.safety <= 0.0 || self.safety > 1.0 {
            return Err(ConfigurationError::InvalidSafety(self.safety).into());
        }
        if !self.min_step.is_finite() || self.min_step < 0.0 {
            return Err(ConfigurationError::InvalidMinStep(self.min_step).into());
        }
        Ok(())
    }

    /// Step-size factor for an error estimate of a scheme of the given order.
    /// h_new = h * safety * (tol / err)^(1 / (order + 1)), clamped to
    /// [MIN_FACTOR, multiplier].
    pub fn factor(&self, error: f64, order: u32) -> f64 {
        if error == 0.0 {
            return self.multiplier;
        }
        let exponent = 1.0 / (f64::from(order) + 1.0);
        let raw = self.safety * (self.tolerance / error).powf(exponent);
        raw.clamp(MIN_FACTOR, self.multiplier)
    }
}

/// Judges steps of an [`ErrorEstimator`] against a [`StepControl`].
pub(crate) struct ControlledPolicy<'e, E: ?Sized> {
    estimator: &'e E,
    control: StepControl,
}

impl<'e, E: ?Sized> ControlledPolicy<'e, E> {
    pub(crate) fn new(estimator: &'e E, control: StepControl) -> Self {
        Self { estimator, control }
    }
}

impl<'e, T, E> StepPolicy<T> for ControlledPolicy<'e, E>
where
    T: Scalar,
    E: ErrorEstimator<T> + ?Sized,
{
    fn dimension(&self) -> usize {
        self.estimator.dimension()
    }

    fn attempt(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<Attempt> {
        let error = self.estimator.advance_with_error(t, h, x, out)?.magnitude();
        if !error.is_finite() {
            return Err(DivergenceError::NonFiniteError { t, h }.into());
        }
        let factor = self.control.factor(error, self.estimator.control_order());
        if error <= self.control.tolerance {
            Ok(Attempt::Accepted {
                error,
                next_h: h * factor,
            })
        } else {
            Ok(Attempt::Rejected {
                retry_h: h * factor.min(1.0),
            })
        }
    }

    fn min_step(&self) -> f64 {
        self.control.min_step
    }
}

// Fehlberg 4(5) tableau.
const C: [f64; 6] = [0.0, 1.0 / 4.0, 3.0 / 8.0, 12.0 / 13.0, 1.0, 1.0 / 2.0];
const A: [[f64; 5]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 4.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 32.0, 9.0 / 32.0, 0.0, 0.0, 0.0],
    [1932.0 / 2197.0, -7200.0 / 2197.0, 7296.0 / 2197.0, 0.0, 0.0],
    [439.0 / 216.0, -8.0, 3680.0 / 513.0, -845.0 / 4104.0, 0.0],
    [-8.0 / 27.0, 2.0, -3544.0 / 2565.0, 1859.0 / 4104.0, -11.0 / 40.0],
];
const B4: [f64; 6] = [25.0 / 216.0, 0.0, 1408.0 / 2565.0, 2197.0 / 4104.0, -1.0 / 5.0, 0.0];
const B5: [f64; 6] = [
    16.0 / 135.0,
    0.0,
    6656.0 / 12825.0,
    28561.0 / 56430.0,
    -9.0 / 50.0,
    2.0 / 55.0,
];

/// Runge-Kutta-Fehlberg 4(5) with adaptive step control.
///
/// The fourth-order solution is propagated; the difference to the embedded
/// fifth-order solution (Euclidean norm) is the error estimate.
pub struct Rkf45<'a, T: Scalar, D: Dynamics<T> + ?Sized> {
    dynamics: &'a D,
    control: StepControl,
    events: EventSettings,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Rkf45<'a, T, D> {
    /// Uses the default [`StepControl`] and [`EventSettings`].
    pub fn new(dynamics: &'a D) -> Self {
        Self {
            dynamics,
            control: StepControl::default(),
            events: EventSettings::default(),
            _scalar: PhantomData,
        }
    }

    /// The event step bound may not undercut the control floor.
    pub fn with_settings(dynamics: &'a D, control: StepControl, events: EventSettings) -> Result<Self> {
        control.validate()?;
        events.validate()?;
        if events.max_step > 0.0 && events.max_step < control.min_step {
            return Err(ConfigurationError::EventStepBounds {
                min: control.min_step,
                max: events.max_step,
            }
            .into());
        }
        Ok(Self {
            dynamics,
            control,
            events,
            _scalar: PhantomData,
        })
    }

    /// Default settings with a custom tolerance.
    pub fn with_tolerance(dynamics: &'a D, tolerance: f64) -> Result<Self> {
        let control = StepControl {
            tolerance,
            ..StepControl::default()
        };
        Self::with_settings(dynamics, control, EventSettings::default())
    }

    pub fn control(&self) -> &StepControl {
        &self.control
    }

    pub fn event_settings(&self) -> &EventSettings {
        &self.events
    }

    /// Adaptive integration without events, reporting every accepted step
    /// together with its error estimate.
    pub fn integrate_controlled(
        &self,
        t0: f64,
        tend: f64,
        nsteps_hint: usize,
        x0: &[T],
    ) -> Result<ControlledRun<T>> {
        let policy = ControlledPolicy::new(self, self.control);
        drive(&policy, &self.events, &NoEvents, t0, tend, nsteps_hint, x0)
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> ErrorEstimator<T> for Rkf45<'a, T, D> {
    fn dimension(&self) -> usize {
        self.dynamics.dimension()
    }

    fn control_order(&self) -> u32 {
        4
    }

    fn advance_with_error(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<T> {
        let n = x.len();
        check_dimension(self.dynamics.name(), n, out.len())?;
        let dt = T::constant(h);

        let mut k = vec![vec![T::zero(); n]; 6];
        let mut tmp = vec![T::zero(); n];

        self.dynamics.evaluate(t, x, &mut k[0])?;
        for s in 1..6 {
            for i in 0..n {
                let mut acc = T::zero();
                for (j, kj) in k.iter().enumerate().take(s) {
                    acc = acc + T::constant(A[s][j]) * kj[i];
                }
                tmp[i] = x[i] + dt * acc;
            }
            self.dynamics.evaluate(t + C[s] * h, &tmp, &mut k[s])?;
        }

        let mut error = T::zero();
        for i in 0..n {
            let mut fourth = T::zero();
            let mut fifth = T::zero();
            for (s, ks) in k.iter().enumerate() {
                fourth = fourth + T::constant(B4[s]) * ks[i];
                fifth = fifth + T::constant(B5[s]) * ks[i];
            }
            out[i] = x[i] + dt * fourth;
            let diff = dt * (fifth - fourth);
            error = error + diff * diff;
        }
        Ok(error.sqrt())
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Integrator<T> for Rkf45<'a, T, D> {
    fn integrate(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>> {
        let run = self.integrate_controlled(t0, tend, nsteps, x0)?;
        Ok(run
            .final_state()
            .map(|x| x.to_vec())
            .unwrap_or_else(|| x0.to_vec()))
    }

    fn integrate_history(
        &self,
        t0: f64,
        tend: f64,
        nsteps: usize,
        x0: &[T],
    ) -> Result<Trajectory<T>> {
        Ok(self.integrate_controlled(t0, tend, nsteps, x0)?.trajectory)
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> EventIntegrator<T> for Rkf45<'a, T, D> {
    fn integrate_with_events<E>(
        &self,
        t0: f64,
        tend: f64,
        nsteps_hint: usize,
        x0: &[T],
        predicate: &E,
    ) -> Result<ControlledRun<T>>
    where
        E: EventPredicate<T> + ?Sized,
    {
        let policy = ControlledPolicy::new(self, self.control);
        drive(&policy, &self.events, predicate, t0, tend, nsteps_hint, x0)
    }
}
