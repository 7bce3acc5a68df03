use crate::error::Result;
use crate::traits::{check_dimension, Dynamics};
use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Dual number for forward-mode differentiation.
/// val: real part
/// eps: infinitesimal part (derivative along the seeded direction)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// A constant: zero derivative.
    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    /// An independent variable: unit derivative.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    // f(val) with derivative f'(val) * eps
    fn chain(self, value: f64, slope: f64) -> Self {
        Self::new(value, slope * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Rem for Dual {
    type Output = Self;
    // a % b = a - b * trunc(a / b); trunc is locally constant.
    fn rem(self, rhs: Self) -> Self {
        let q = (self.val / rhs.val).trunc();
        Self::new(self.val % rhs.val, self.eps - q * rhs.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for Dual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for Dual {
    type FromStrRadixErr = <f64 as Num>::FromStrRadixErr;
    fn from_str_radix(src: &str, radix: u32) -> std::result::Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(src, radix).map(Self::constant)
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for Dual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::new(-0.0, -0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.val.is_nan() || self.eps.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite() || self.eps.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite() && self.eps.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.val.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.val.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.val.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.val.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.eps)
    }
    fn abs(self) -> Self {
        Self::new(
            self.val.abs(),
            if self.val >= 0.0 { self.eps } else { -self.eps },
        )
    }
    fn signum(self) -> Self {
        Self::constant(self.val.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::one() / self
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        self.chain(self.val.powi(n), <f64 as From<i32>>::from(n) * self.val.powi(n - 1))
    }

    fn powf(self, n: Self) -> Self {
        // x^y = exp(y ln x)
        let val_pow = self.val.powf(n.val);
        let mut eps_new = n.val * self.val.powf(n.val - 1.0) * self.eps;
        if n.eps != 0.0 {
            eps_new += val_pow * self.val.ln() * n.eps;
        }
        Self::new(val_pow, eps_new)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.chain(s, 0.5 / s)
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.chain(e, e)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * std::f64::consts::LN_2)
    }

    fn ln(self) -> Self {
        self.chain(self.val.ln(), 1.0 / self.val)
    }

    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }

    fn log2(self) -> Self {
        self.chain(self.val.log2(), 1.0 / (self.val * std::f64::consts::LN_2))
    }

    fn log10(self) -> Self {
        self.chain(self.val.log10(), 1.0 / (self.val * std::f64::consts::LN_10))
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val || other.val.is_nan() {
            self
        } else {
            other
        }
    }

    fn min(self, other: Self) -> Self {
        if self.val < other.val || other.val.is_nan() {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        if self.val > other.val {
            self - other
        } else {
            Self::zero()
        }
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        self.chain(c, 1.0 / (3.0 * c * c))
    }

    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn sin(self) -> Self {
        self.chain(self.val.sin(), self.val.cos())
    }

    fn cos(self) -> Self {
        self.chain(self.val.cos(), -self.val.sin())
    }

    fn tan(self) -> Self {
        let t = self.val.tan();
        self.chain(t, 1.0 + t * t)
    }

    fn asin(self) -> Self {
        self.chain(self.val.asin(), 1.0 / (1.0 - self.val * self.val).sqrt())
    }

    fn acos(self) -> Self {
        self.chain(self.val.acos(), -1.0 / (1.0 - self.val * self.val).sqrt())
    }

    fn atan(self) -> Self {
        self.chain(self.val.atan(), 1.0 / (1.0 + self.val * self.val))
    }

    // d atan2(y, x) = (x dy - y dx) / (x^2 + y^2)
    fn atan2(self, other: Self) -> Self {
        let r2 = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / r2,
        )
    }

    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }

    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), 1.0 / (1.0 + self.val))
    }

    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }

    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }

    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, 1.0 - t * t)
    }

    fn asinh(self) -> Self {
        self.chain(self.val.asinh(), 1.0 / (self.val * self.val + 1.0).sqrt())
    }

    fn acosh(self) -> Self {
        self.chain(self.val.acosh(), 1.0 / (self.val * self.val - 1.0).sqrt())
    }

    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), 1.0 / (1.0 - self.val * self.val))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

// --- Variational equations ---

/// Augments an n-dimensional system with its state-transition matrix.
///
/// The state is `[x, Phi]` with `Phi` stored row-major after `x`, and
/// `dPhi/dt = J(x) Phi`. The Jacobian is formed column by column from dual
/// evaluations of the inner system.
pub struct TangentDynamics<'a, D: ?Sized> {
    inner: &'a D,
}

impl<'a, D> TangentDynamics<'a, D>
where
    D: Dynamics<f64> + Dynamics<Dual> + ?Sized,
{
    pub fn new(inner: &'a D) -> Self {
        Self { inner }
    }

    fn base_dimension(&self) -> usize {
        Dynamics::<f64>::dimension(self.inner)
    }

    /// `[x0, I]`
    pub fn initial_state(&self, x0: &[f64]) -> Result<Vec<f64>> {
        let n = self.base_dimension();
        check_dimension(self.name(), n, x0.len())?;
        let mut state = x0.to_vec();
        // row-major
        state.extend(DMatrix::<f64>::identity(n, n).transpose().iter().copied());
        Ok(state)
    }

    /// Reads `Phi` back out of an augmented state.
    pub fn state_transition(&self, state: &[f64]) -> Result<DMatrix<f64>> {
        check_dimension(self.name(), self.dimension(), state.len())?;
        Ok(self.transition(state))
    }

    /// Jacobian of the inner vector field at `(t, x)`.
    pub fn jacobian(&self, t: f64, x: &[f64]) -> Result<DMatrix<f64>> {
        check_dimension(self.name(), self.base_dimension(), x.len())?;
        Ok(self.jacobian_unchecked(t, x))
    }

    fn transition(&self, state: &[f64]) -> DMatrix<f64> {
        let n = self.base_dimension();
        DMatrix::from_row_slice(n, n, &state[n..n + n * n])
    }

    fn jacobian_unchecked(&self, t: f64, x: &[f64]) -> DMatrix<f64> {
        let n = self.base_dimension();
        let mut jacobian = DMatrix::zeros(n, n);
        let mut dual_x = vec![Dual::zero(); n];
        let mut dual_out = vec![Dual::zero(); n];

        for j in 0..n {
            for (i, xi) in dual_x.iter_mut().enumerate() {
                *xi = Dual::new(x[i], if i == j { 1.0 } else { 0.0 });
            }
            self.inner.derivative(t, &dual_x, &mut dual_out);
            for (i, value) in dual_out.iter().enumerate() {
                jacobian[(i, j)] = value.eps;
            }
        }
        jacobian
    }
}

impl<'a, D> Dynamics<f64> for TangentDynamics<'a, D>
where
    D: Dynamics<f64> + Dynamics<Dual> + ?Sized,
{
    fn name(&self) -> &str {
        Dynamics::<f64>::name(self.inner)
    }

    fn dimension(&self) -> usize {
        let n = self.base_dimension();
        n + n * n
    }

    fn derivative(&self, t: f64, state: &[f64], out: &mut [f64]) {
        let n = self.base_dimension();
        let (x, _) = state.split_at(n);
        self.inner.derivative(t, x, &mut out[..n]);

        let product = self.jacobian_unchecked(t, x) * self.transition(state);
        for i in 0..n {
            for j in 0..n {
                out[n + i * n + j] = product[(i, j)];
            }
        }
    }
}
