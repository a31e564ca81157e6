pub mod errors;
pub mod point;
pub mod workflow;

pub use errors::*;
pub use point::*;
pub use workflow::*;
