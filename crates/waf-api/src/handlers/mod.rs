pub mod domains;
pub mod faults;
pub mod rules;

pub use domains::*;
pub use faults::*;
pub use rules::*;
