#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod data;
pub mod fit;
pub mod pairwise;
pub mod polynomial;
pub mod progress;
pub mod types;
pub mod variance;

pub use fit::{CovarianceError, fit, fit_dyn, fit_with_options, fit_with_progress};
pub use pairwise::{JointMoments, pairwise_covariance, profile_objective};
pub use progress::{ConsoleFitProgress, FitProgressObserver, FitProgressStage, NoopFitProgress};
pub use types::{FitOptions, VarianceConvention};
pub use variance::{marginal_variance, marginal_variances};
