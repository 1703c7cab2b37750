//! Margin venue boundary
//!
//! The venue's matching and liquidation engine is external; the vault only
//! forwards instructions through `MarginVenue` and reads valuations back.

mod paper;
mod traits;

pub use paper::{PaperMarket, PaperVenue};
pub use traits::{MarginValuation, MarginVenue};

#[cfg(test)]
pub use traits::MockMarginVenue;
