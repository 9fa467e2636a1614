pub mod call;
pub mod insights;
pub mod status;

pub use call::*;
pub use insights::*;
pub use status::*;
