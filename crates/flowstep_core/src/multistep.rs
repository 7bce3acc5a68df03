use crate::error::{ConfigurationError, Result, ValidationError};
use crate::fixed_step::{advance_time, check_finite};
use crate::solvers::Rk4;
use crate::traits::{check_dimension, Dynamics, Integrator, Scalar, StepAdvancer};
use crate::trajectory::Trajectory;
use std::collections::VecDeque;
use std::marker::PhantomData;

pub const MIN_ORDER: usize = 1;
pub const MAX_ORDER: usize = 8;

/// (denominator, numerators), newest derivative first.
const BASHFORTH: [(f64, &[f64]); MAX_ORDER] = [
    (1.0, &[1.0]),
    (2.0, &[3.0, -1.0]),
    (12.0, &[23.0, -16.0, 5.0]),
    (24.0, &[55.0, -59.0, 37.0, -9.0]),
    (720.0, &[1901.0, -2774.0, 2616.0, -1274.0, 251.0]),
    (1440.0, &[4277.0, -7923.0, 9982.0, -7298.0, 2877.0, -475.0]),
    (
        60480.0,
        &[198721.0, -447288.0, 705549.0, -688256.0, 407139.0, -134472.0, 19087.0],
    ),
    (
        120960.0,
        &[
            434241.0, -1152169.0, 2183877.0, -2664477.0, 2102243.0, -1041723.0, 295767.0,
            -36799.0,
        ],
    ),
];

/// (denominator, numerators); the first weight multiplies the predicted derivative.
const MOULTON: [(f64, &[f64]); MAX_ORDER] = [
    (1.0, &[1.0]),
    (2.0, &[1.0, 1.0]),
    (12.0, &[5.0, 8.0, -1.0]),
    (24.0, &[9.0, 19.0, -5.0, 1.0]),
    (720.0, &[251.0, 646.0, -264.0, 106.0, -19.0]),
    (1440.0, &[475.0, 1427.0, -798.0, 482.0, -173.0, 27.0]),
    (
        60480.0,
        &[19087.0, 65112.0, -46461.0, 37504.0, -20211.0, 6312.0, -863.0],
    ),
    (
        120960.0,
        &[
            36799.0, 139849.0, -121797.0, 123133.0, -88547.0, 41499.0, -11351.0, 1375.0,
        ],
    ),
];

/// Adams-Bashforth-Moulton predictor-corrector in PECE mode.
///
/// The first `order - 1` steps are taken with RK4 to fill the derivative
/// history.
pub struct AdamsBashforthMoulton<'a, T: Scalar, D: Dynamics<T> + ?Sized> {
    dynamics: &'a D,
    order: usize,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> AdamsBashforthMoulton<'a, T, D> {
    pub const NAME: &'static str = "Adams-Bashforth-Moulton";

    pub fn new(dynamics: &'a D, order: usize) -> Result<Self> {
        if !(MIN_ORDER..=MAX_ORDER).contains(&order) {
            return Err(ConfigurationError::InvalidOrder {
                scheme: Self::NAME,
                order,
                min: MIN_ORDER,
                max: MAX_ORDER,
            }
            .into());
        }
        Ok(Self {
            dynamics,
            order,
            _scalar: PhantomData,
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn weights(table: &[(f64, &[f64])], order: usize) -> Vec<T> {
        let (denominator, numerators) = table[order - 1];
        numerators
            .iter()
            .map(|&c| T::constant(c / denominator))
            .collect()
    }

    fn run<F>(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T], mut record: F) -> Result<Vec<T>>
    where
        F: FnMut(f64, &[T]),
    {
        if nsteps == 0 {
            return Err(ValidationError::ZeroSteps.into());
        }
        let n = self.dynamics.dimension();
        check_dimension(self.dynamics.name(), n, x0.len())?;

        let predictor = Self::weights(&BASHFORTH, self.order);
        let corrector = Self::weights(&MOULTON, self.order);
        let starter = Rk4::new(self.dynamics);
        let h = (tend - t0) / nsteps as f64;

        let mut x = x0.to_vec();
        let mut next = vec![T::zero(); n];
        let mut predicted_rate = vec![T::zero(); n];

        // Newest first.
        let mut history: VecDeque<Vec<T>> = VecDeque::with_capacity(self.order + 1);
        let mut rate = vec![T::zero(); n];
        self.dynamics.evaluate(t0, &x, &mut rate)?;
        history.push_front(rate);

        let mut t = t0;
        for i in 0..nsteps {
            let t_next = advance_time(t0, h, i + 1, nsteps, tend);
            let dt = T::constant(t_next - t);

            if history.len() < self.order {
                starter.advance(t, t_next - t, &x, &mut next)?;
            } else {
                // predict
                for k in 0..n {
                    let mut acc = T::zero();
                    for (beta, f) in predictor.iter().zip(history.iter()) {
                        acc = acc + *beta * f[k];
                    }
                    next[k] = x[k] + dt * acc;
                }
                // evaluate
                self.dynamics.evaluate(t_next, &next, &mut predicted_rate)?;
                // correct
                for k in 0..n {
                    let mut acc = corrector[0] * predicted_rate[k];
                    for (alpha, f) in corrector[1..].iter().zip(history.iter()) {
                        acc = acc + *alpha * f[k];
                    }
                    next[k] = x[k] + dt * acc;
                }
            }

            check_finite(t_next, &next)?;
            std::mem::swap(&mut x, &mut next);
            t = t_next;

            // evaluate
            let mut rate = if history.len() == self.order {
                history.pop_back().unwrap_or_else(|| vec![T::zero(); n])
            } else {
                vec![T::zero(); n]
            };
            self.dynamics.evaluate(t, &x, &mut rate)?;
            history.push_front(rate);

            record(t, &x);
        }
        Ok(x)
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Integrator<T> for AdamsBashforthMoulton<'a, T, D> {
    fn integrate(&self, t0: f64, tend: f64, nsteps: usize, x0: &[T]) -> Result<Vec<T>> {
        self.run(t0, tend, nsteps, x0, |_, _| {})
    }

    fn integrate_history(
        &self,
        t0: f64,
        tend: f64,
        nsteps: usize,
        x0: &[T],
    ) -> Result<Trajectory<T>> {
        let mut history = Trajectory::with_capacity(nsteps);
        self.run(t0, tend, nsteps, x0, |t, x| history.push(t, x))?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HamiltonianFlow, Pendulum};
    use crate::symplectic::{Symplectic, SymplecticScheme};

    struct Decay;

    impl Dynamics<f64> for Decay {
        fn name(&self) -> &str {
            "decay"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, state: &[f64], out: &mut [f64]) {
            out[0] = -state[0];
        }
    }

    /// dx/dt = x^2 blows up at t = 1 for x(0) = 1.
    struct Blowup;

    impl Dynamics<f64> for Blowup {
        fn name(&self) -> &str {
            "blowup"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, state: &[f64], out: &mut [f64]) {
            out[0] = state[0] * state[0];
        }
    }

    fn global_error(order: usize, nsteps: usize) -> f64 {
        let abm = AdamsBashforthMoulton::new(&Decay, order).expect("valid order");
        let x = abm
            .integrate(0.0, 1.0, nsteps, &[1.0f64])
            .expect("integration should succeed");
        (x[0] - (-1.0f64).exp()).abs()
    }

    #[test]
    fn coefficients_sum_to_one() {
        for table in [&BASHFORTH, &MOULTON] {
            for (order, (denominator, numerators)) in table.iter().enumerate() {
                assert_eq!(numerators.len(), order + 1);
                let sum: f64 = numerators.iter().sum();
                assert_eq!(sum, *denominator);
            }
        }
    }

    #[test]
    fn order_outside_range_is_rejected() {
        for order in [0, 9] {
            let err = AdamsBashforthMoulton::<f64, _>::new(&Decay, order)
                .err()
                .expect("invalid order");
            assert!(err.is_configuration());
            assert!(format!("{err}").contains("order must lie in 1..=8"));
        }
    }

    #[test]
    fn low_orders_converge_at_nominal_rate() {
        let second = global_error(2, 20) / global_error(2, 40);
        assert!(second > 3.6 && second < 4.6, "order 2 ratio {second}");

        let fourth = global_error(4, 20) / global_error(4, 40);
        assert!(fourth > 14.0 && fourth < 19.0, "order 4 ratio {fourth}");
    }

    #[test]
    fn higher_order_is_more_accurate() {
        assert!(global_error(6, 40) < global_error(4, 40));
        assert!(global_error(4, 40) < global_error(2, 40));
    }

    #[test]
    fn history_and_final_state_agree() {
        let abm = AdamsBashforthMoulton::new(&Decay, 5).expect("valid order");
        let traj = abm.integrate_history(0.0, 2.0, 16, &[1.0f64]).expect("history");
        let x = abm.integrate(0.0, 2.0, 16, &[1.0f64]).expect("final state");
        assert_eq!(traj.len(), 16);
        assert_eq!(traj.final_time(), Some(2.0));
        assert_eq!(traj.final_state(), Some(x.as_slice()));
    }

    #[test]
    fn fewer_steps_than_startup_still_reaches_tend() {
        let abm = AdamsBashforthMoulton::new(&Decay, 8).expect("valid order");
        let x = abm.integrate(0.0, 1.0, 3, &[1.0f64]).expect("integration");
        assert!((x[0] - (-1.0f64).exp()).abs() < 1e-3);
    }

    #[test]
    fn rejects_zero_steps_and_wrong_dimension() {
        let abm = AdamsBashforthMoulton::new(&Decay, 3).expect("valid order");
        assert!(abm.integrate(0.0, 1.0, 0, &[1.0f64]).expect_err("zero").is_validation());
        assert!(abm
            .integrate(0.0, 1.0, 5, &[1.0f64, 2.0])
            .expect_err("dimension")
            .is_validation());
    }

    #[test]
    fn finite_time_blowup_is_reported() {
        let abm = AdamsBashforthMoulton::new(&Blowup, 4).expect("valid order");
        let err = abm.integrate(0.0, 2.0, 10, &[1.0f64]).expect_err("blowup");
        assert!(err.is_divergence());
    }

    #[test]
    fn pendulum_energy_drifts_unlike_symplectic_scheme() {
        let pendulum = Pendulum::unit();
        let flow = HamiltonianFlow::new(&pendulum);
        let x0 = [0.1f64, 0.01];
        let h0 = pendulum.energy(x0[0], x0[1]);

        let abm = AdamsBashforthMoulton::new(&flow, 6).expect("valid order");
        let yoshida = Symplectic::new(&pendulum, SymplecticScheme::yoshida6()).expect("separable");

        let xa = abm.integrate(0.0, 1.0e4, 100_000, &x0).expect("abm");
        let xs = yoshida.integrate(0.0, 1.0e4, 100_000, &x0).expect("yoshida");

        let abm_drift = (pendulum.energy(xa[0], xa[1]) - h0).abs();
        let symplectic_drift = (pendulum.energy(xs[0], xs[1]) - h0).abs();
        assert!(abm_drift > 1.0e-7, "abm drift {abm_drift}");
        assert!(symplectic_drift < 1.0e-9, "symplectic drift {symplectic_drift}");
    }
}
