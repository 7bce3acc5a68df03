//! Reference dynamical systems: population dynamics, orbital mechanics and
//! one-degree-of-freedom Hamiltonians.

use crate::error::{ConfigurationError, Result};
use crate::traits::{Dynamics, Hamiltonian, MixedVariableHamiltonian, Scalar};

/// Gravitational parameter of the Earth [m^3/s^2].
pub const EARTH_MU: f64 = 398600.4415e9;
/// Equatorial radius of the Earth [m].
pub const EARTH_RADIUS: f64 = 6378.0e3;
/// Rotation rate of the Earth [rad/s].
pub const EARTH_ROTATION: f64 = 7.2921150e-5;
/// Reference altitude of the exponential atmosphere [m].
pub const ATMOSPHERE_REFERENCE_ALTITUDE: f64 = 900000.0;

fn check_frequency(model: &'static str, omega: f64) -> Result<()> {
    if !omega.is_finite() || omega <= 0.0 {
        return Err(ConfigurationError::InvalidParameter {
            model,
            name: "omega",
            requirement: "positive and finite",
            value: omega,
        }
        .into());
    }
    Ok(())
}

fn check_parameter_count<T>(model: &'static str, expected: usize, params: &[T]) -> Result<()> {
    if params.len() != expected {
        return Err(ConfigurationError::ParameterCount {
            model,
            expected,
            got: params.len(),
        }
        .into());
    }
    Ok(())
}

/// Predator-prey system
/// dx/dt = a x - b x y
/// dy/dt = -c y + d x y
#[derive(Debug, Clone)]
pub struct LotkaVolterra<T> {
    params: Vec<T>,
}

impl<T: Scalar> LotkaVolterra<T> {
    pub const NAME: &'static str = "Lotka-Volterra";

    /// `params = [a, b, c, d]`
    pub fn new(params: Vec<T>) -> Result<Self> {
        check_parameter_count(Self::NAME, 4, &params)?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &[T] {
        &self.params
    }
}

impl<T: Scalar> Dynamics<T> for LotkaVolterra<T> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dimension(&self) -> usize {
        2
    }

    fn derivative(&self, _t: f64, state: &[T], out: &mut [T]) {
        let p = &self.params;
        let xy = state[0] * state[1];
        out[0] = p[0] * state[0] - p[1] * xy;
        out[1] = -p[2] * state[1] + p[3] * xy;
    }
}

/// Controlled two-body problem around the Earth.
///
/// State: `[x, y, z, vx, vy, vz, m]`. The acceleration is central gravity
/// plus thrust over mass, exponential-atmosphere drag on the Earth-relative
/// velocity and a constant unmodelled term. Mass decreases as
/// `dm/dt = -alpha |thrust|`.
///
/// Parameters, in order: thrust (3), `alpha`, `rho0`, `H`, `C_D A`,
/// unmodelled acceleration (3).
#[derive(Debug, Clone)]
pub struct TwoBody<T> {
    params: Vec<T>,
    t_scale: f64,
    r_scale: f64,
}

impl<T: Scalar> TwoBody<T> {
    pub const NAME: &'static str = "Two Body Problem";

    /// SI units: both scaling factors are 1.
    pub fn new(params: Vec<T>) -> Result<Self> {
        Self::with_scaling(params, 1.0, 1.0)
    }

    /// Time is measured in units of `t_scale` seconds and lengths in units of
    /// `r_scale` metres.
    pub fn with_scaling(params: Vec<T>, t_scale: f64, r_scale: f64) -> Result<Self> {
        check_parameter_count(Self::NAME, 10, &params)?;
        for (name, value) in [("t_scale", t_scale), ("r_scale", r_scale)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidScaling {
                    model: Self::NAME,
                    name,
                    value,
                }
                .into());
            }
        }
        Ok(Self {
            params,
            t_scale,
            r_scale,
        })
    }

    /// Scaled gravitational parameter.
    pub fn mu(&self) -> f64 {
        EARTH_MU * self.t_scale.powi(2) / self.r_scale.powi(3)
    }
}

impl<T: Scalar> Dynamics<T> for TwoBody<T> {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dimension(&self) -> usize {
        7
    }

    fn derivative(&self, _t: f64, state: &[T], out: &mut [T]) {
        let p = &self.params;
        let radius = T::constant(EARTH_RADIUS / self.r_scale);
        let mu = T::constant(self.mu());
        let omega = T::constant(EARTH_ROTATION * self.t_scale);
        let h0 = T::constant(ATMOSPHERE_REFERENCE_ALTITUDE / self.r_scale);
        let half = T::constant(0.5);

        let r = (state[0] * state[0] + state[1] * state[1] + state[2] * state[2]).sqrt();
        let gravity = mu / (r * r * r);

        let rho = p[4] * (-(r - radius - h0) / p[5]).exp();

        let rel_vx = state[3] - omega * state[1];
        let rel_vy = state[4] + omega * state[0];
        let rel_v = (rel_vx * rel_vx + rel_vy * rel_vy + state[5] * state[5]).sqrt();
        let drag = half * rho * p[6] * rel_v / state[6];

        let mass = state[6];
        out[0] = state[3];
        out[1] = state[4];
        out[2] = state[5];
        out[3] = -gravity * state[0] + p[0] / mass + p[7] - drag * rel_vx;
        out[4] = -gravity * state[1] + p[1] / mass + p[8] - drag * rel_vy;
        out[5] = -gravity * state[2] + p[2] / mass + p[9] - drag * state[5];
        out[6] = -p[3] * (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
    }
}

/// Mathematical pendulum, `H = p^2/2 - omega^2 cos q`.
///
/// The frequency is a plain constant, so the model serves every scalar type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pendulum {
    omega: f64,
}

impl Pendulum {
    pub const NAME: &'static str = "pendulum";

    pub fn new(omega: f64) -> Result<Self> {
        check_frequency(Self::NAME, omega)?;
        Ok(Self { omega })
    }

    /// `omega = 1`
    pub fn unit() -> Self {
        Self { omega: 1.0 }
    }

    pub fn energy<T: Scalar>(&self, q: T, p: T) -> T {
        let w2 = T::constant(self.omega * self.omega);
        T::constant(0.5) * p * p - w2 * q.cos()
    }
}

impl<T: Scalar> Hamiltonian<T> for Pendulum {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn degrees_of_freedom(&self) -> usize {
        1
    }

    fn is_separable(&self) -> bool {
        true
    }

    fn grad_q(&self, _t: f64, q: &[T], _p: &[T], out: &mut [T]) {
        out[0] = T::constant(self.omega * self.omega) * q[0].sin();
    }

    fn grad_p(&self, _t: f64, _q: &[T], p: &[T], out: &mut [T]) {
        out[0] = p[0];
    }
}

/// Quartic oscillator `H = p^2/2 + omega^2 q^2/2 + epsilon q^4/4`.
///
/// The harmonic part is integrable in action-angle variables
/// `theta = atan2(omega q, p)`, `J = (p^2 + omega^2 q^2) / (2 omega)`, where
/// it reduces to `H0 = omega J`. The quartic term is the kick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnharmonicOscillator {
    omega: f64,
    epsilon: f64,
}

impl AnharmonicOscillator {
    pub const NAME: &'static str = "anharmonic oscillator";

    /// `omega` must be positive: the action-angle map divides by it.
    pub fn new(omega: f64, epsilon: f64) -> Result<Self> {
        check_frequency(Self::NAME, omega)?;
        if !epsilon.is_finite() {
            return Err(ConfigurationError::InvalidParameter {
                model: Self::NAME,
                name: "epsilon",
                requirement: "finite",
                value: epsilon,
            }
            .into());
        }
        Ok(Self { omega, epsilon })
    }

    pub fn energy<T: Scalar>(&self, q: T, p: T) -> T {
        let half = T::constant(0.5);
        let w2 = T::constant(self.omega * self.omega);
        let quarter_eps = T::constant(0.25 * self.epsilon);
        half * p * p + half * w2 * q * q + quarter_eps * q.powi(4)
    }
}

impl<T: Scalar> Hamiltonian<T> for AnharmonicOscillator {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn degrees_of_freedom(&self) -> usize {
        1
    }

    fn is_separable(&self) -> bool {
        true
    }

    fn grad_q(&self, _t: f64, q: &[T], _p: &[T], out: &mut [T]) {
        let w2 = T::constant(self.omega * self.omega);
        out[0] = w2 * q[0] + T::constant(self.epsilon) * q[0].powi(3);
    }

    fn grad_p(&self, _t: f64, _q: &[T], p: &[T], out: &mut [T]) {
        out[0] = p[0];
    }
}

impl<T: Scalar> MixedVariableHamiltonian<T> for AnharmonicOscillator {
    // Mixed coordinates are (theta, J): dtheta/dt = dH0/dJ = omega.
    fn drift_gradient(&self, _t: f64, _q_mixed: &[T], _p_mixed: &[T], out: &mut [T]) {
        out[0] = T::constant(self.omega);
    }

    fn kick_gradient(&self, _t: f64, q: &[T], _p: &[T], out: &mut [T]) {
        out[0] = T::constant(self.epsilon) * q[0].powi(3);
    }

    fn to_mixed(&self, q: &[T], p: &[T], q_mixed: &mut [T], p_mixed: &mut [T]) {
        let omega = T::constant(self.omega);
        let wq = omega * q[0];
        q_mixed[0] = wq.atan2(p[0]);
        p_mixed[0] = (p[0] * p[0] + wq * wq) / (T::constant(2.0) * omega);
    }

    fn from_mixed(&self, q_mixed: &[T], p_mixed: &[T], q: &mut [T], p: &mut [T]) {
        let omega = T::constant(self.omega);
        let two_j = T::constant(2.0) * p_mixed[0];
        let (sin, cos) = q_mixed[0].sin_cos();
        q[0] = (two_j / omega).sqrt() * sin;
        p[0] = (two_j * omega).sqrt() * cos;
    }
}

/// First-order view of a Hamiltonian system: state `[q, p]`,
/// `dq/dt = dH/dp`, `dp/dt = -dH/dq`.
pub struct HamiltonianFlow<'a, H: ?Sized> {
    hamiltonian: &'a H,
}

impl<'a, H: ?Sized> HamiltonianFlow<'a, H> {
    pub fn new(hamiltonian: &'a H) -> Self {
        Self { hamiltonian }
    }
}

impl<'a, T: Scalar, H: Hamiltonian<T> + ?Sized> Dynamics<T> for HamiltonianFlow<'a, H> {
    fn name(&self) -> &str {
        self.hamiltonian.name()
    }

    fn dimension(&self) -> usize {
        2 * self.hamiltonian.degrees_of_freedom()
    }

    fn derivative(&self, t: f64, state: &[T], out: &mut [T]) {
        let n = self.hamiltonian.degrees_of_freedom();
        let (q, p) = state.split_at(n);
        let (dq, dp) = out.split_at_mut(n);
        self.hamiltonian.grad_p(t, q, p, dq);
        self.hamiltonian.grad_q(t, q, p, dp);
        for v in dp.iter_mut() {
            *v = -*v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn parameter_counts_are_checked() {
        assert_err_contains(LotkaVolterra::new(vec![1.0f64, 2.0]), "needs 4 entries, got 2");
        assert_err_contains(TwoBody::new(vec![0.0f64; 9]), "needs 10 entries, got 9");
        assert_err_contains(
            TwoBody::with_scaling(vec![0.0f64; 10], 0.0, 1.0),
            "scaling factor `t_scale`",
        );
    }

    #[test]
    fn frequencies_must_be_positive_and_finite() {
        for omega in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert_err_contains(Pendulum::new(omega), "parameter `omega` must be positive");
            assert_err_contains(
                AnharmonicOscillator::new(omega, 0.1),
                "parameter `omega` must be positive",
            );
        }
        assert_err_contains(
            AnharmonicOscillator::new(1.0, f64::NAN),
            "parameter `epsilon` must be finite",
        );
        let err = Pendulum::new(0.0).expect_err("zero frequency");
        assert!(err.is_configuration());
        assert!(Pendulum::new(0.5).is_ok());
    }

    #[test]
    fn lotka_volterra_field() {
        let system = LotkaVolterra::new(vec![1.0f64, 0.5, 0.75, 0.25]).expect("valid parameters");
        let mut out = [0.0f64; 2];
        system.evaluate(0.0, &[2.0, 1.0], &mut out).expect("valid call");
        assert_abs_diff_eq!(out[0], 2.0 - 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(out[1], -0.75 + 0.5, epsilon = 1e-15);
    }

    #[test]
    fn lotka_volterra_rejects_negative_time_and_bad_state() {
        let system = LotkaVolterra::new(vec![1.0f64, 0.5, 0.75, 0.25]).expect("valid parameters");
        let mut out = [0.0f64; 2];
        assert_err_contains(system.evaluate(-0.5, &[2.0, 1.0], &mut out), "negative time");
        let mut wide = [0.0f64; 3];
        assert_err_contains(
            system.evaluate(0.0, &[2.0, 1.0, 0.0], &mut wide),
            "Expected 2, got 3",
        );
    }

    #[test]
    fn two_body_gravity_and_mass_flow() {
        let mut params = vec![0.0f64; 10];
        params[0] = 3.0;
        params[1] = 4.0;
        params[3] = 0.1;
        params[5] = 1.0e6;
        let system = TwoBody::new(params).expect("valid parameters");
        let r = 7.0e6;
        let mut out = [0.0f64; 7];
        system
            .evaluate(0.0, &[r, 0.0, 0.0, 0.0, 7.5e3, 0.0, 2.0], &mut out)
            .expect("valid call");

        assert_eq!(out[1], 7.5e3);
        assert_abs_diff_eq!(out[3], -EARTH_MU / (r * r) + 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(out[4], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[6], -0.5, epsilon = 1e-15);
    }

    #[test]
    fn two_body_drag_opposes_relative_velocity() {
        let mut params = vec![0.0f64; 10];
        params[4] = 1.0e-9;
        params[5] = 50.0e3;
        params[6] = 10.0;
        let system = TwoBody::new(params).expect("valid parameters");
        let r = EARTH_RADIUS + 400.0e3;
        let mut with_drag = [0.0f64; 7];
        system
            .evaluate(0.0, &[r, 0.0, 0.0, 0.0, 0.0, 7.0e3, 100.0], &mut with_drag)
            .expect("valid call");
        assert!(with_drag[5] < 0.0);
    }

    #[test]
    fn hamiltonian_flow_matches_canonical_equations() {
        let pendulum = Pendulum::new(2.0).expect("valid frequency");
        let flow = HamiltonianFlow::new(&pendulum);
        let mut out = [0.0f64; 2];
        flow.evaluate(0.0, &[0.3f64, -0.2], &mut out).expect("valid call");
        assert_abs_diff_eq!(out[0], -0.2, epsilon = 1e-15);
        assert_abs_diff_eq!(out[1], -4.0 * 0.3f64.sin(), epsilon = 1e-15);
        assert_eq!(Dynamics::<f64>::dimension(&flow), 2);
    }

    #[test]
    fn action_angle_round_trip() {
        let osc = AnharmonicOscillator::new(1.5, 0.2).expect("valid parameters");
        for &(q, p) in &[(0.4f64, 0.1), (-1.2, 0.7), (0.3, -2.0), (-0.5, -0.5)] {
            let (qm, pm) = osc.convert_to_mixed(&[q], &[p]).expect("valid");
            let (q2, p2) = osc.convert_from_mixed(&qm, &pm).expect("valid");
            assert_abs_diff_eq!(q2[0], q, epsilon = 1e-12);
            assert_abs_diff_eq!(p2[0], p, epsilon = 1e-12);
        }
    }

    #[test]
    fn action_is_harmonic_energy_over_omega() {
        let osc = AnharmonicOscillator::new(2.0, 0.0).expect("valid parameters");
        let omega = 2.0f64;
        let (_, j) = osc.convert_to_mixed(&[0.5f64], &[1.0]).expect("valid");
        assert_abs_diff_eq!(omega * j[0], osc.energy(0.5f64, 1.0), epsilon = 1e-12);
    }
}
