#![deny(dead_code)]
#![deny(unused_imports)]

pub mod draws;
pub mod error;
pub mod linalg;
pub mod model;
mod sampler;
pub mod stream;
mod sweep;

pub use draws::GibbsDraws;
pub use error::BqrError;
pub use linalg::{LinalgError, SpdCholesky, SpdFactor, spd_inverse};
pub use model::{PriorSpec, QuantileModel};
pub use stream::StreamPool;
