//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared by the bridge, the coordinator, every
//! worker and the progress relay. It is checked at each suspension point.

mod token;

pub use token::CancellationToken;
