//! Value types carried through every gated call.

pub mod analysis;
pub mod context;
pub mod result;

pub use analysis::*;
pub use context::*;
pub use result::*;
