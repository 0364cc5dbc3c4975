mod choice;
mod error;
mod key;
mod preprocessing;
mod selector;
mod tune_benchmark;
mod tune_cache;
mod tuner;
mod util;

pub use choice::*;
pub use error::*;
pub use key::*;
pub use preprocessing::*;
pub use selector::*;
pub use tune_benchmark::*;
pub use tune_cache::*;
pub use tuner::*;
pub use util::*;
