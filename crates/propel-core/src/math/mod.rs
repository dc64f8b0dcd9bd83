//! Numeric helpers shared by the path engine and adapters.

mod vecn;

pub use vecn::VecN;
