mod backend;
mod backends;
pub mod classifier;
mod result;

pub use backend::{DetectorBackend, LabelFilter};
pub use backends::ReplayBackend;
pub use classifier::{evaluate, Evaluation, WarningPolicy, WarningRule, ZoneState};
pub use result::Detection;
