pub mod chart;
pub mod signals;
pub mod ws;

pub use chart::*;
pub use signals::*;
pub use ws::*;
