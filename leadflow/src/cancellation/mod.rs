//! Cooperative cancellation, checked by the pipeline between stages.

mod token;

pub use token::CancellationToken;
