//! Share accounting
//!
//! share price = total vault value / shares outstanding.
//! Minting `value * supply / total_value` shares for a deposit, or paying
//! `shares * total_value / supply` for a withdrawal, leaves the price unchanged.
//! Both directions truncate toward zero, so rounding dust always stays in the vault.

use rust_decimal::Decimal;

use crate::error::{Result, VaultError};

/// `amount * numerator / denominator` with a 128-bit intermediate, truncated
pub fn mul_div(amount: u64, numerator: u64, denominator: u64) -> Result<u64> {
    if denominator == 0 {
        return Err(VaultError::InternalInvariantViolation(
            "division by zero".to_string(),
        ));
    }
    let wide = (amount as u128) * (numerator as u128) / (denominator as u128);
    u64::try_from(wide).map_err(|_| VaultError::MathOverflow)
}

/// Shares minted for a deposit, at the valuation taken before the deposit.
///
/// The first deposit into an empty vault mints 1 share per unit deposited.
pub fn shares_to_mint_for_deposit(
    deposit_amount: u64,
    total_value_before: u64,
    total_shares_before: u64,
) -> Result<u64> {
    if total_shares_before == 0 {
        return Ok(deposit_amount);
    }
    if total_value_before == 0 {
        return Err(VaultError::InternalInvariantViolation(format!(
            "division by zero: {} shares outstanding against zero vault value",
            total_shares_before
        )));
    }
    mul_div(deposit_amount, total_shares_before, total_value_before)
}

/// Value paid out for burning shares, at the valuation taken before the withdrawal
pub fn value_for_shares_on_withdraw(
    burned_shares: u64,
    total_value_before: u64,
    total_shares_before: u64,
) -> Result<u64> {
    if total_shares_before == 0 {
        return Err(VaultError::InternalInvariantViolation(
            "division by zero: withdrawal from a vault with no shares outstanding".to_string(),
        ));
    }
    if burned_shares > total_shares_before {
        return Err(VaultError::InternalInvariantViolation(format!(
            "burning {} shares exceeds supply {}",
            burned_shares, total_shares_before
        )));
    }
    mul_div(burned_shares, total_value_before, total_shares_before)
}

/// Value of one share; 1 while no shares exist
pub fn share_price(total_value: u64, total_shares: u64) -> Decimal {
    if total_shares == 0 {
        return Decimal::ONE;
    }
    Decimal::from(total_value) / Decimal::from(total_shares)
}
