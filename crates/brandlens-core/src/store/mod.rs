pub mod analysis;

pub use analysis::{AnalysisState, AnalysisStore, Subscription};
