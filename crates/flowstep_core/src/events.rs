//! Event-aware propagation.
//!
//! The loop in [`drive`] is shared by the adaptive integrators (with a
//! predicate that never fires) and by the event-aware wrappers. After each
//! successful step the predicate is evaluated on the candidate state; a
//! condition whose outcome changes to a nonzero value is an event. The step is
//! then halved and retried until it is no longer than
//! [`EventSettings::min_step`] (or the policy's own minimum step, if larger),
//! which brackets the crossing between the last accepted state and the
//! recorded event state.

use crate::error::{ConfigurationError, DivergenceError, Result, ValidationError};
use crate::fixed_step::{check_finite, propagate, propagate_history};
use crate::traits::{check_dimension, EventIntegrator, Integrator, Scalar, StepAdvancer};
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};

/// Monitors conditions along a trajectory.
pub trait EventPredicate<T: Scalar> {
    /// One entry per monitored condition, 0 meaning "no event".
    /// `elapsed` is the time since the start of the integration.
    ///
    /// Events are transitions: a condition fires when its outcome becomes
    /// nonzero or switches to a different nonzero value. The outcomes at `x0`
    /// are the baseline, so a condition already nonzero there does not fire
    /// until it has returned to 0 (or changed value). Returning to 0 never
    /// fires.
    fn check(&self, state: &[T], elapsed: f64) -> Vec<i32>;

    /// `false` for predicates that never fire, so drivers can skip them.
    fn is_active(&self) -> bool {
        true
    }
}

impl<T, F> EventPredicate<T> for F
where
    T: Scalar,
    F: Fn(&[T], f64) -> Vec<i32>,
{
    fn check(&self, state: &[T], elapsed: f64) -> Vec<i32> {
        self(state, elapsed)
    }
}

/// Predicate used by plain integration: a single condition that is always 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl<T: Scalar> EventPredicate<T> for NoEvents {
    fn check(&self, _state: &[T], _elapsed: f64) -> Vec<i32> {
        vec![0]
    }

    fn is_active(&self) -> bool {
        false
    }
}

/// Step bounds used while monitoring events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Steps are halved around an event until they are at most this long.
    pub min_step: f64,
    /// Upper bound on the step while monitoring; 0 disables the bound.
    pub max_step: f64,
    /// End the integration at the first event and report its time as `tend`.
    pub stop_on_event: bool,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            min_step: 1.0e-4,
            max_step: 0.0,
            stop_on_event: true,
        }
    }
}

impl EventSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.min_step.is_finite() || self.min_step <= 0.0 {
            return Err(ConfigurationError::NonPositiveEventStep(self.min_step).into());
        }
        if !self.max_step.is_finite() || self.max_step < 0.0 {
            return Err(ConfigurationError::NegativeMaxEventStep(self.max_step).into());
        }
        if self.max_step > 0.0 && self.max_step < self.min_step {
            return Err(ConfigurationError::EventStepBounds {
                min: self.min_step,
                max: self.max_step,
            }
            .into());
        }
        Ok(())
    }

    fn bound(&self, h: f64) -> f64 {
        if self.max_step > 0.0 && h.abs() > self.max_step {
            self.max_step.copysign(h)
        } else {
            h
        }
    }
}

/// A localized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    /// End of the bracketing step; the crossing lies within `min_step` before it.
    pub time: f64,
    pub state: Vec<T>,
    pub outcomes: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
    pub event_refinements: usize,
}

/// Result of a controlled (adaptive and/or event-aware) integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlledRun<T> {
    pub trajectory: Trajectory<T>,
    /// Error estimate of every accepted step (0 for fixed-step schemes).
    pub step_errors: Vec<f64>,
    pub events: Vec<Event<T>>,
    /// Final time reached; earlier than requested when stopped on an event.
    pub tend: f64,
    pub stats: StepStats,
}

impl<T: Clone> ControlledRun<T> {
    fn empty(tend: f64) -> Self {
        Self {
            trajectory: Trajectory::new(),
            step_errors: Vec::new(),
            events: Vec::new(),
            tend,
            stats: StepStats::default(),
        }
    }

    pub fn final_state(&self) -> Option<&[T]> {
        self.trajectory.final_state()
    }
}

/// Outcome of a single attempted step.
pub(crate) enum Attempt {
    Accepted { error: f64, next_h: f64 },
    Rejected { retry_h: f64 },
}

/// How a driver obtains and judges steps.
pub(crate) trait StepPolicy<T: Scalar> {
    fn dimension(&self) -> usize;

    fn attempt(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<Attempt>;

    /// Absolute floor on the step size.
    fn min_step(&self) -> f64 {
        0.0
    }
}

/// Fixed-step policy: every step is accepted and the nominal step is kept.
struct FixedPolicy<'s, S: ?Sized> {
    stepper: &'s S,
    nominal: f64,
}

impl<'s, T, S> StepPolicy<T> for FixedPolicy<'s, S>
where
    T: Scalar,
    S: StepAdvancer<T> + ?Sized,
{
    fn dimension(&self) -> usize {
        self.stepper.dimension()
    }

    fn attempt(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<Attempt> {
        self.stepper.advance(t, h, x, out)?;
        Ok(Attempt::Accepted {
            error: 0.0,
            next_h: self.nominal,
        })
    }
}

/// Shared controlled loop. `nsteps_hint` seeds the first step.
pub(crate) fn drive<T, P, E>(
    policy: &P,
    settings: &EventSettings,
    predicate: &E,
    t0: f64,
    tend: f64,
    nsteps_hint: usize,
    x0: &[T],
) -> Result<ControlledRun<T>>
where
    T: Scalar,
    P: StepPolicy<T> + ?Sized,
    E: EventPredicate<T> + ?Sized,
{
    if nsteps_hint == 0 {
        return Err(ValidationError::ZeroSteps.into());
    }
    check_dimension("integrator", policy.dimension(), x0.len())?;
    for t in [t0, tend] {
        if !t.is_finite() {
            return Err(ValidationError::NonFiniteTime {
                model: "integrator".to_string(),
                t,
            }
            .into());
        }
    }

    let mut run = ControlledRun::empty(tend);
    if t0 == tend {
        return Ok(run);
    }

    let direction = (tend - t0).signum();
    // Bisection never goes below the policy's own floor.
    let event_floor = settings.min_step.max(policy.min_step());
    let monitor = predicate.is_active();
    let mut previous = if monitor {
        predicate.check(x0, 0.0)
    } else {
        Vec::new()
    };

    let mut t = t0;
    let mut h = (tend - t0) / nsteps_hint as f64;
    let mut x = x0.to_vec();
    let mut candidate = x0.to_vec();
    let mut refining = false;

    while (tend - t) * direction > 0.0 {
        if monitor {
            h = settings.bound(h);
        }
        // A remainder within rounding of h is taken as the final step.
        let last = (tend - t).abs() <= h.abs() * (1.0 + 1.0e-9);
        let t_next = if last { tend } else { t + h };
        let step = t_next - t;

        let min_step = resolution(t).max(policy.min_step());
        if !last && h.abs() < min_step {
            return Err(DivergenceError::StepSizeUnderflow { t, h, min: min_step }.into());
        }

        let next_h = match policy.attempt(t, step, &x, &mut candidate)? {
            Attempt::Rejected { retry_h } => {
                run.stats.rejected += 1;
                h = retry_h;
                continue;
            }
            Attempt::Accepted { error, next_h } => {
                check_finite(t_next, &candidate)?;
                if monitor {
                    let outcomes = predicate.check(&candidate, t_next - t0);
                    if triggered(&previous, &outcomes) {
                        // Compare the requested step: t + h - t may round above h.
                        if step.abs().min(h.abs()) > event_floor {
                            run.stats.event_refinements += 1;
                            refining = true;
                            h = (0.5 * step.abs()).max(event_floor) * direction;
                            continue;
                        }
                        run.events.push(Event {
                            time: t_next,
                            state: candidate.clone(),
                            outcomes: outcomes.clone(),
                        });
                        refining = false;
                        previous = outcomes;
                        commit(&mut run, &mut t, &mut x, &mut candidate, t_next, error);
                        if settings.stop_on_event {
                            run.tend = t_next;
                            break;
                        }
                        h = next_h.abs().max(policy.min_step()) * direction;
                        continue;
                    }
                    previous = outcomes;
                }
                commit(&mut run, &mut t, &mut x, &mut candidate, t_next, error);
                next_h
            }
        };

        // While bisecting towards an event the step must not grow back.
        // An accepted step never proposes a successor below the policy floor.
        h = if refining {
            next_h.abs().min(step.abs()).max(policy.min_step()) * direction
        } else {
            next_h.abs().max(policy.min_step()) * direction
        };
    }

    Ok(run)
}

fn commit<T: Scalar>(
    run: &mut ControlledRun<T>,
    t: &mut f64,
    x: &mut Vec<T>,
    candidate: &mut Vec<T>,
    t_next: f64,
    error: f64,
) {
    *t = t_next;
    std::mem::swap(x, candidate);
    run.trajectory.push(t_next, x);
    run.step_errors.push(error);
    run.stats.accepted += 1;
}

/// A condition fires when its outcome becomes nonzero or changes value.
fn triggered(previous: &[i32], current: &[i32]) -> bool {
    current
        .iter()
        .enumerate()
        .any(|(i, &v)| v != 0 && previous.get(i).copied().unwrap_or(0) != v)
}

/// Ten units in the last place of `t`: steps shorter than this no longer
/// move the clock reliably.
fn resolution(t: f64) -> f64 {
    let a = t.abs();
    10.0 * (f64::from_bits(a.to_bits() + 1) - a)
}

/// Adds event monitoring to any fixed-step scheme.
///
/// Plain `integrate` calls go through the ordinary fixed-step loop; the
/// event-aware entry point uses `(tend - t0) / nsteps_hint` as the nominal
/// step and halves it around events.
pub struct EventAware<S> {
    stepper: S,
    settings: EventSettings,
}

impl<S> EventAware<S> {
    pub fn new(stepper: S, settings: EventSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { stepper, settings })
    }

    pub fn settings(&self) -> &EventSettings {
        &self.settings
    }

    pub fn inner(&self) -> &S {
        &self.stepper
    }
}

impl<T: Scalar, S: StepAdvancer<T>> StepAdvancer<T> for EventAware<S> {
    fn dimension(&self) -> usize {
        self.stepper.dimension()
    }

    fn advance(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<()> {
        self.stepper.advance(t, h, x, out)
    }
}

impl<T: Scalar, S: StepAdvancer<T>> Integrator<T> for EventAware<S> {
    fn integrate(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>> {
        propagate(&self.stepper, t0, tend, nsteps, x0)
    }

    fn integrate_history(
        &self,
        t0: f64,
        tend: f64,
        nsteps: usize,
        x0: &[T],
    ) -> Result<Trajectory<T>> {
        propagate_history(&self.stepper, t0, tend, nsteps, x0)
    }
}

impl<T: Scalar, S: StepAdvancer<T>> EventIntegrator<T> for EventAware<S> {
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
        let nominal = if nsteps_hint == 0 {
            0.0
        } else {
            (tend - t0) / nsteps_hint as f64
        };
        let policy = FixedPolicy {
            stepper: &self.stepper,
            nominal,
        };
        drive(&policy, &self.settings, predicate, t0, tend, nsteps_hint, x0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HamiltonianFlow, Pendulum};
    use crate::solvers::Rk4;
    use crate::traits::Dynamics;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    /// x'' = -x written as a first-order system.
    struct Oscillator;

    impl Dynamics<f64> for Oscillator {
        fn name(&self) -> &str {
            "oscillator"
        }

        fn dimension(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, state: &[f64], out: &mut [f64]) {
            out[0] = state[1];
            out[1] = -state[0];
        }
    }

    fn crosses_zero(state: &[f64], _elapsed: f64) -> Vec<i32> {
        vec![if state[0] < 0.0 { 1 } else { 0 }]
    }

    #[test]
    fn settings_validation_rejects_bad_bounds() {
        let bad_min = EventSettings {
            min_step: 0.0,
            ..EventSettings::default()
        };
        assert!(bad_min.validate().expect_err("zero min").is_configuration());

        let bad_max = EventSettings {
            max_step: -1.0,
            ..EventSettings::default()
        };
        assert!(bad_max.validate().expect_err("negative max").is_configuration());

        let inverted = EventSettings {
            min_step: 0.1,
            max_step: 0.01,
            stop_on_event: true,
        };
        assert!(EventAware::new((), inverted).is_err());
    }

    #[test]
    fn triggered_requires_a_new_nonzero_outcome() {
        assert!(!triggered(&[0], &[0]));
        assert!(triggered(&[0], &[1]));
        assert!(!triggered(&[1], &[1]));
        assert!(!triggered(&[1], &[0]));
        assert!(triggered(&[1], &[-1]));
        assert!(triggered(&[], &[0, 2]));
    }

    #[test]
    fn fixed_step_event_brackets_zero_crossing() {
        let rk4 = Rk4::new(&Oscillator);
        let settings = EventSettings {
            min_step: 1.0e-4,
            max_step: 0.05,
            stop_on_event: true,
        };
        let integrator = EventAware::new(rk4, settings).expect("valid settings");
        let run = integrator
            .integrate_with_events(0.0, 10.0, 100, &[1.0f64, 0.0], &crosses_zero)
            .expect("integration should succeed");

        assert_eq!(run.events.len(), 1);
        let event = &run.events[0];
        assert_eq!(event.outcomes, vec![1]);
        assert_eq!(run.tend, event.time);
        assert!(event.time >= FRAC_PI_2 - 1.0e-6);
        assert!(event.time - FRAC_PI_2 <= settings.min_step + 1.0e-6);
        assert!(run.stats.event_refinements > 0);

        // The last step before the event ends on the non-crossed side.
        let times = &run.trajectory.times;
        let before = times[times.len() - 2];
        assert!(before < FRAC_PI_2 + 1.0e-6);
        assert!(event.time - before <= settings.min_step + 1.0e-12);
    }

    #[test]
    fn condition_active_at_start_fires_only_on_reentry() {
        // x = cos t starts above 0.5, leaves at pi/3 and comes back at 5pi/3.
        let integrator =
            EventAware::new(Rk4::new(&Oscillator), EventSettings::default()).expect("valid");
        let above_half = |state: &[f64], _elapsed: f64| vec![i32::from(state[0] > 0.5)];
        let run = integrator
            .integrate_with_events(0.0, 7.0, 140, &[1.0f64, 0.0], &above_half)
            .expect("integration should succeed");

        assert_eq!(run.events.len(), 1);
        let reentry = 5.0 * std::f64::consts::FRAC_PI_3;
        assert!(run.tend >= reentry - 1.0e-5);
        assert!(run.tend - reentry <= 1.0e-4 + 1.0e-5);
    }

    #[test]
    fn continuing_after_event_records_each_crossing() {
        let rk4 = Rk4::new(&Oscillator);
        let settings = EventSettings {
            min_step: 1.0e-3,
            max_step: 0.0,
            stop_on_event: false,
        };
        let integrator = EventAware::new(rk4, settings).expect("valid settings");
        let run = integrator
            .integrate_with_events(0.0, 7.0, 140, &[1.0f64, 0.0], &crosses_zero)
            .expect("integration should succeed");

        // x = cos t enters x < 0 at pi/2 and leaves it at 3pi/2; only entering
        // is an event, the next entry is at 5pi/2 > 7.
        assert_eq!(run.events.len(), 1);
        assert_eq!(run.tend, 7.0);
        assert_eq!(run.trajectory.final_time(), Some(7.0));
    }

    #[test]
    fn no_events_matches_plain_integration() {
        let pendulum = Pendulum::unit();
        let flow = HamiltonianFlow::new(&pendulum);
        let rk4 = Rk4::new(&flow);
        let plain = rk4
            .integrate(0.0, 2.0, 40, &[0.1f64, 0.01])
            .expect("plain integration");

        let integrator = EventAware::new(Rk4::new(&flow), EventSettings::default())
            .expect("valid settings");
        let run = integrator
            .integrate_with_events(0.0, 2.0, 40, &[0.1f64, 0.01], &NoEvents)
            .expect("event integration");

        assert_eq!(run.stats.accepted, 40);
        assert!(run.events.is_empty());
        let last = run.final_state().expect("non-empty run");
        assert_abs_diff_eq!(last[0], plain[0], epsilon = 1e-12);
        assert_abs_diff_eq!(last[1], plain[1], epsilon = 1e-12);
    }

    #[test]
    fn backward_event_integration_is_supported() {
        let rk4 = Rk4::new(&Oscillator);
        let integrator = EventAware::new(rk4, EventSettings::default()).expect("valid settings");
        // Starting at t = 2 on cos/sin, going back crosses x = 0 at pi/2.
        let x0 = [2.0f64.cos(), -(2.0f64.sin())];
        let positive = |state: &[f64], _elapsed: f64| vec![i32::from(state[0] > 0.0)];
        let run = integrator
            .integrate_with_events(2.0, 0.0, 50, &x0, &positive)
            .expect("integration should succeed");

        assert_eq!(run.events.len(), 1);
        assert!(run.tend <= FRAC_PI_2 + 1.0e-6);
        assert!(FRAC_PI_2 - run.tend <= 1.0e-4 + 1.0e-6);
    }

    #[test]
    fn event_integration_rejects_zero_hint() {
        let integrator =
            EventAware::new(Rk4::new(&Oscillator), EventSettings::default()).expect("valid");
        let err = integrator
            .integrate_with_events(0.0, 1.0, 0, &[1.0f64, 0.0], &crosses_zero)
            .expect_err("zero hint");
        assert!(err.is_validation());
    }
}
