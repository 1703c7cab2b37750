pub mod limits;
pub mod shares;

pub use limits::{DepositTicket, LimitsLedger, LimitsUpdate, RetroactivePolicy, WhitelistEntry};
pub use shares::{
    mul_div, share_price, shares_to_mint_for_deposit, value_for_shares_on_withdraw,
};
