use crate::error::Result;
use crate::fixed_step::{propagate, propagate_history};
use crate::traits::{check_dimension, Dynamics, Integrator, Scalar, StepAdvancer};
use crate::trajectory::Trajectory;
use std::marker::PhantomData;

/// Third-order Runge-Kutta (Ralston) Solver
///
/// Stages at `t`, `t + h/2`, `t + 3h/4`, weights `2/9, 3/9, 4/9`.
pub struct Rk3<'a, T: Scalar, D: Dynamics<T> + ?Sized> {
    dynamics: &'a D,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Rk3<'a, T, D> {
    /// The dynamics must outlive the integrator; the borrow enforces it.
    pub fn new(dynamics: &'a D) -> Self {
        Self {
            dynamics,
            _scalar: PhantomData,
        }
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> StepAdvancer<T> for Rk3<'a, T, D> {
    fn dimension(&self) -> usize {
        self.dynamics.dimension()
    }

    fn advance(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<()> {
        let n = x.len();
        check_dimension(self.dynamics.name(), n, out.len())?;
        let hh = T::constant(h);
        let half = T::constant(0.5);
        let three_quarters = T::constant(0.75);
        let ninth = T::constant(1.0 / 9.0);
        let (two, three, four) = (T::constant(2.0), T::constant(3.0), T::constant(4.0));

        let mut k1 = vec![T::zero(); n];
        let mut k2 = vec![T::zero(); n];
        let mut k3 = vec![T::zero(); n];
        let mut tmp = vec![T::zero(); n];

        // k1 = f(t, x)
        self.dynamics.evaluate(t, x, &mut k1)?;

        // k2 = f(t + h/2, x + h/2 k1)
        for i in 0..n {
            tmp[i] = x[i] + hh * half * k1[i];
        }
        self.dynamics.evaluate(t + 0.5 * h, &tmp, &mut k2)?;

        // k3 = f(t + 3h/4, x + 3h/4 k2)
        for i in 0..n {
            tmp[i] = x[i] + hh * three_quarters * k2[i];
        }
        self.dynamics.evaluate(t + 0.75 * h, &tmp, &mut k3)?;

        for i in 0..n {
            out[i] = x[i] + hh * ninth * (two * k1[i] + three * k2[i] + four * k3[i]);
        }
        Ok(())
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Integrator<T> for Rk3<'a, T, D> {
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

/// Classic Runge-Kutta 4th Order Solver
pub struct Rk4<'a, T: Scalar, D: Dynamics<T> + ?Sized> {
    dynamics: &'a D,
    _scalar: PhantomData<T>,
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Rk4<'a, T, D> {
    pub fn new(dynamics: &'a D) -> Self {
        Self {
            dynamics,
            _scalar: PhantomData,
        }
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> StepAdvancer<T> for Rk4<'a, T, D> {
    fn dimension(&self) -> usize {
        self.dynamics.dimension()
    }

    fn advance(&self, t: f64, h: f64, x: &[T], out: &mut [T]) -> Result<()> {
        let n = x.len();
        check_dimension(self.dynamics.name(), n, out.len())?;
        let dt = T::constant(h);
        let half = T::constant(0.5);
        let sixth = T::constant(1.0 / 6.0);
        let two = T::constant(2.0);

        let mut k1 = vec![T::zero(); n];
        let mut k2 = vec![T::zero(); n];
        let mut k3 = vec![T::zero(); n];
        let mut k4 = vec![T::zero(); n];
        let mut tmp = vec![T::zero(); n];

        // k1 = f(t, y)
        self.dynamics.evaluate(t, x, &mut k1)?;

        // k2 = f(t + dt/2, y + dt*k1/2)
        for i in 0..n {
            tmp[i] = x[i] + dt * k1[i] * half;
        }
        self.dynamics.evaluate(t + 0.5 * h, &tmp, &mut k2)?;

        // k3 = f(t + dt/2, y + dt*k2/2)
        for i in 0..n {
            tmp[i] = x[i] + dt * k2[i] * half;
        }
        self.dynamics.evaluate(t + 0.5 * h, &tmp, &mut k3)?;

        // k4 = f(t + dt, y + dt*k3)
        for i in 0..n {
            tmp[i] = x[i] + dt * k3[i];
        }
        self.dynamics.evaluate(t + h, &tmp, &mut k4)?;

        // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
        for i in 0..n {
            out[i] = x[i] + dt * sixth * (k1[i] + two * k2[i] + two * k3[i] + k4[i]);
        }
        Ok(())
    }
}

impl<'a, T: Scalar, D: Dynamics<T> + ?Sized> Integrator<T> for Rk4<'a, T, D> {
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

#[cfg(test)]
mod tests {
    use super::{Rk3, Rk4};
    use crate::autodiff::Dual;
    use crate::models::LotkaVolterra;
    use crate::traits::{Dynamics, Integrator, Scalar, StepAdvancer};
    use approx::assert_relative_eq;

    struct Decay {
        rate: f64,
    }

    impl<T: Scalar> Dynamics<T> for Decay {
        fn name(&self) -> &str {
            "decay"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, state: &[T], out: &mut [T]) {
            out[0] = -T::constant(self.rate) * state[0];
        }
    }

    /// dx/dt = t^2, exact for any scheme of order >= 3.
    struct Quadratic;

    impl Dynamics<f64> for Quadratic {
        fn name(&self) -> &str {
            "quadratic"
        }

        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, t: f64, _state: &[f64], out: &mut [f64]) {
            out[0] = t * t;
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

    fn global_error<I: Integrator<f64>>(integrator: &I, nsteps: usize) -> f64 {
        let x = integrator
            .integrate(0.0, 1.0, nsteps, &[1.0])
            .expect("integration should succeed");
        (x[0] - (-1.0f64).exp()).abs()
    }

    #[test]
    fn rk4_error_shrinks_with_fourth_power() {
        let system = Decay { rate: 1.0 };
        let rk4 = Rk4::new(&system);
        let coarse = global_error(&rk4, 10);
        let fine = global_error(&rk4, 20);
        let ratio = coarse / fine;
        assert!(ratio > 14.0 && ratio < 18.0, "ratio was {ratio}");
    }

    #[test]
    fn rk3_error_shrinks_with_third_power() {
        let system = Decay { rate: 1.0 };
        let rk3 = Rk3::new(&system);
        let coarse = global_error(&rk3, 10);
        let fine = global_error(&rk3, 20);
        let ratio = coarse / fine;
        assert!(ratio > 7.0 && ratio < 9.0, "ratio was {ratio}");
    }

    #[test]
    fn stage_times_follow_the_tableau() {
        // Integrating t^2 is exact only if the stage times are right.
        let rk3 = Rk3::new(&Quadratic);
        let rk4 = Rk4::new(&Quadratic);
        let x3 = rk3.integrate(0.0, 2.0, 3, &[0.0]).expect("rk3");
        let x4 = rk4.integrate(0.0, 2.0, 3, &[0.0]).expect("rk4");
        assert_relative_eq!(x3[0], 8.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(x4[0], 8.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn forward_then_backward_returns_to_start() {
        let system = LotkaVolterra::new(vec![1.0f64, 0.5, 0.75, 0.25]).expect("valid parameters");
        let rk4 = Rk4::new(&system);
        let x0 = [2.0, 1.0];
        let forward = rk4.integrate(0.0, 5.0, 500, &x0).expect("forward");
        let back = rk4.integrate(5.0, 0.0, 500, &forward).expect("backward");
        assert_relative_eq!(back[0], x0[0], epsilon = 1e-7);
        assert_relative_eq!(back[1], x0[1], epsilon = 1e-7);
    }

    #[test]
    fn step_propagates_validation_errors() {
        let system = Decay { rate: 1.0 };
        let rk4 = Rk4::new(&system);
        let mut out = vec![0.0];
        let err = StepAdvancer::<f64>::advance(&rk4, -1.0, 0.1, &[1.0], &mut out)
            .expect_err("negative time");
        assert!(err.is_validation());

        let err = rk4
            .integrate(0.0, 1.0, 10, &[1.0, 2.0])
            .expect_err("wrong dimension");
        assert!(err.is_validation());
    }

    #[test]
    fn finite_time_blowup_is_reported() {
        let rk4 = Rk4::new(&Blowup);
        let err = rk4.integrate(0.0, 2.0, 10, &[1.0f64]).expect_err("blowup");
        assert!(err.is_divergence());
        let err = Rk3::new(&Blowup)
            .integrate_history(0.0, 2.0, 10, &[1.0f64])
            .expect_err("blowup");
        assert!(err.is_divergence());
    }

    #[test]
    fn rk4_carries_dual_sensitivities() {
        // x(t) = x0 exp(-t), so dx(1)/dx0 = exp(-1).
        let system = Decay { rate: 1.0 };
        let rk4 = Rk4::new(&system);
        let x = rk4
            .integrate(0.0, 1.0, 50, &[Dual::new(2.0, 1.0)])
            .expect("integration should succeed");
        assert_relative_eq!(x[0].val, 2.0 * (-1.0f64).exp(), epsilon = 1e-8);
        assert_relative_eq!(x[0].eps, (-1.0f64).exp(), epsilon = 1e-8);
    }
}
