mod conv;
mod tiling2d;

pub use conv::*;
pub use tiling2d::*;
