//! Engine module - genome decoding, evaluation, mutation, the
//! generational loop, search-space adaptation, and persistence.

mod adaptive;
mod codec;
mod evaluator;
mod mutation;
mod search;
mod store;

pub use adaptive::*;
pub use codec::*;
pub use evaluator::*;
pub use mutation::*;
pub use search::*;
pub use store::*;
