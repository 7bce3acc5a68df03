pub mod adaptive;
pub mod autodiff;
pub mod error;
pub mod events;
pub mod fixed_step;
pub mod models;
pub mod multistep;
pub mod solvers;
pub mod symplectic;
/// The `flowstep_core` crate is a toolbox of numerical integrators for systems of
/// ordinary differential equations. Integrators are generic over the `Scalar` trait,
/// so they run on plain `f64` as well as on Dual numbers.
///
/// Key components:
/// - **Traits**: `Scalar`, `Dynamics` and `Hamiltonian` (problem side), `StepAdvancer`,
///   `ErrorEstimator` and `Integrator` (solver side).
/// - **Solvers**: fixed-step RK3 and RK4, adaptive Runge-Kutta-Fehlberg 4(5), symplectic
///   splitting schemes (plain and mixed-variable) and Adams-Bashforth-Moulton.
/// - **Events**: event predicates with step refinement around state changes.
/// - **Models**: Lotka-Volterra, a two-body problem with drag, a pendulum and an
///   anharmonic oscillator.
/// - **Autodiff**: Dual numbers and `TangentDynamics` for state-transition matrices.
pub mod traits;
pub mod trajectory;

pub use adaptive::{Rkf45, StepControl};
pub use error::{ConfigurationError, DivergenceError, IntegrationError, Result, ValidationError};
pub use events::{ControlledRun, Event, EventAware, EventPredicate, EventSettings, NoEvents, StepStats};
pub use multistep::AdamsBashforthMoulton;
pub use solvers::{Rk3, Rk4};
pub use symplectic::{MixedVariableSymplectic, StageOrdering, Symplectic, SymplecticScheme};
pub use traits::{
    Dynamics, ErrorEstimator, EventIntegrator, Hamiltonian, Integrator, MixedVariableHamiltonian,
    Scalar, StepAdvancer,
};
pub use trajectory::Trajectory;
