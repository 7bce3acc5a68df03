use thiserror::Error;

/// Top-level error returned by every fallible operation in the crate.
///
/// The three categories are kept apart so callers can tell a bad setup
/// (raised once, at construction) from a bad call (raised at the offending
/// evaluation) and from a numerical breakdown during propagation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Divergence(#[from] DivergenceError),
}

impl IntegrationError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, IntegrationError::Configuration(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, IntegrationError::Validation(_))
    }

    pub fn is_divergence(&self) -> bool {
        matches!(self, IntegrationError::Divergence(_))
    }
}

/// Invalid constructor argument.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("{model}: the parameter list needs {expected} entries, got {got}")]
    ParameterCount {
        model: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{model}: scaling factor `{name}` must be positive and finite, got {value}")]
    InvalidScaling {
        model: &'static str,
        name: &'static str,
        value: f64,
    },
    #[error("{model}: parameter `{name}` must be {requirement}, got {value}")]
    InvalidParameter {
        model: &'static str,
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },
    #[error("tolerance must be positive and finite, got {0}")]
    NonPositiveTolerance(f64),
    #[error("step-size multiplier must be finite and at least 1, got {0}")]
    InvalidMultiplier(f64),
    #[error("safety factor must lie in (0, 1], got {0}")]
    InvalidSafety(f64),
    #[error("minimum step size must be non-negative and finite, got {0}")]
    InvalidMinStep(f64),
    #[error("minimum step size for events must be positive, got {0}")]
    NonPositiveEventStep(f64),
    #[error("maximum step size for events must be non-negative (0 disables the bound), got {0}")]
    NegativeMaxEventStep(f64),
    #[error("maximum step size for events ({max}) is smaller than the minimum ({min})")]
    EventStepBounds { min: f64, max: f64 },
    #[error("{scheme}: order must lie in {min}..={max}, got {order}")]
    InvalidOrder {
        scheme: &'static str,
        order: usize,
        min: usize,
        max: usize,
    },
    #[error("{scheme}: symplectic integrator cannot operate on a non-separable Hamiltonian")]
    NonSeparable { scheme: String },
    #[error("{scheme}: coefficient arrays must be non-empty and of equal length")]
    InvalidCoefficients { scheme: String },
}

/// Invalid argument passed to a single evaluation or integration call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{model}: negative time {t} supplied in evaluation of the dynamical system")]
    NegativeTime { model: String, t: f64 },
    #[error("{model}: time {t} is not finite")]
    NonFiniteTime { model: String, t: f64 },
    #[error("{model}: state dimension mismatch. Expected {expected}, got {got}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        got: usize,
    },
    #[error("number of integration steps must be at least 1")]
    ZeroSteps,
}

/// Numerical breakdown detected while propagating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DivergenceError {
    #[error("error estimate is not finite at t = {t} (h = {h})")]
    NonFiniteError { t: f64, h: f64 },
    #[error("state became non-finite at t = {t}")]
    NonFiniteState { t: f64 },
    #[error("step size {h} at t = {t} fell below the minimum resolvable step {min} without meeting the tolerance")]
    StepSizeUnderflow { t: f64, h: f64, min: f64 },
}

pub type Result<T> = std::result::Result<T, IntegrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinguishable() {
        let config: IntegrationError = ConfigurationError::NonPositiveTolerance(0.0).into();
        let validation: IntegrationError = ValidationError::ZeroSteps.into();
        let divergence: IntegrationError = DivergenceError::NonFiniteState { t: 1.0 }.into();

        assert!(config.is_configuration());
        assert!(validation.is_validation());
        assert!(divergence.is_divergence());
        assert!(!config.is_validation());
    }

    #[test]
    fn messages_carry_context() {
        let err: IntegrationError = ValidationError::DimensionMismatch {
            model: "Lotka-Volterra".to_string(),
            expected: 2,
            got: 3,
        }
        .into();
        let message = format!("{err}");
        assert!(message.contains("Lotka-Volterra"));
        assert!(message.contains("Expected 2, got 3"));
    }
}
