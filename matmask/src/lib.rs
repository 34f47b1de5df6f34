//! Two-party masked matrix product with a threshold decision.
//!
//! One party holds scores `S`, the other holds weights `W` and a threshold row `T`.
//! They exchange only masked tables and end up with `G = [S·W ≥ T]`.

pub mod errors;
pub mod linalg;
pub mod mask;
pub mod party;
pub mod table;
pub mod transport;
