mod config;
mod constants;
mod error;
mod policy;
mod route;
mod stats;
mod threshold;
mod weights;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use policy::*;
pub use route::*;
pub use stats::*;
pub use threshold::*;
pub use weights::*;
