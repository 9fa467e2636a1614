pub mod normalize;
pub mod orchestrator;
pub mod talk_ratio;

pub use normalize::*;
pub use orchestrator::*;
pub use talk_ratio::*;
