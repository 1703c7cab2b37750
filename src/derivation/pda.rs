//! Program-derived sub-account addresses
//!
//! Every vault-owned account is a PDA of the strategy program, seeded with the
//! strategy identity and a fixed ASCII role label. The spot open-orders account
//! belongs to the venue program and is seeded with the margin account instead.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Result, VaultError};

pub const VAULT_SEED: &[u8] = b"vault";
pub const MINT_SEED: &[u8] = b"mint";
pub const ACCOUNT_SEED: &[u8] = b"account";
pub const OPEN_ORDERS_SEED: &[u8] = b"OpenOrders";

/// Program ids and fixed sub-indices every derivation depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramIds {
    /// Program that owns the vault token account, share mint and strategy account
    pub strategy_program: Pubkey,
    /// Margin venue program
    pub venue_program: Pubkey,
    /// Margin venue group the margin account lives in
    pub venue_group: Pubkey,
    pub margin_account_num: u64,
    pub open_orders_sub_index: u64,
}

/// Sub-account roles of a single vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    VaultTokenAccount,
    ShareMint,
    StrategyAccount,
    OpenOrders,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::VaultTokenAccount,
        Role::ShareMint,
        Role::StrategyAccount,
        Role::OpenOrders,
    ];

    pub fn label(&self) -> &'static [u8] {
        match self {
            Role::VaultTokenAccount => VAULT_SEED,
            Role::ShareMint => MINT_SEED,
            Role::StrategyAccount => ACCOUNT_SEED,
            Role::OpenOrders => OPEN_ORDERS_SEED,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::VaultTokenAccount => "vault",
            Role::ShareMint => "mint",
            Role::StrategyAccount => "account",
            Role::OpenOrders => "OpenOrders",
        }
    }

    /// Program the address is derived under
    pub fn owner_program(&self, programs: &ProgramIds) -> Pubkey {
        match self {
            Role::OpenOrders => programs.venue_program,
            _ => programs.strategy_program,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A derived address together with the bump that reproduces it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub identity: Pubkey,
    pub role: Role,
    pub address: Pubkey,
    pub bump: u8,
}

fn role_seeds(
    role: Role,
    identity: &Pubkey,
    margin_account: &Pubkey,
    programs: &ProgramIds,
) -> Vec<Vec<u8>> {
    match role {
        Role::OpenOrders => vec![
            margin_account.to_bytes().to_vec(),
            programs.open_orders_sub_index.to_le_bytes().to_vec(),
            OPEN_ORDERS_SEED.to_vec(),
        ],
        _ => vec![identity.to_bytes().to_vec(), role.label().to_vec()],
    }
}

/// Find the address and bump for `role` by exhaustive bump search (255 down to 0)
pub fn derive(
    identity: &Pubkey,
    role: Role,
    margin_account: &Pubkey,
    programs: &ProgramIds,
) -> Result<DerivedAddress> {
    let seeds = role_seeds(role, identity, margin_account, programs);
    let seed_refs: Vec<&[u8]> = seeds.iter().map(|s| s.as_slice()).collect();
    let program = role.owner_program(programs);

    let (address, bump) = Pubkey::try_find_program_address(&seed_refs, &program).ok_or_else(
        || {
            VaultError::AddressDerivationFailure(format!(
                "no valid bump for role '{}' of {} under {}",
                role, identity, program
            ))
        },
    )?;

    Ok(DerivedAddress {
        identity: *identity,
        role,
        address,
        bump,
    })
}

/// Recompute an address from its seeds and a stored bump
pub fn recreate(
    identity: &Pubkey,
    role: Role,
    margin_account: &Pubkey,
    bump: u8,
    programs: &ProgramIds,
) -> Result<Pubkey> {
    let mut seeds = role_seeds(role, identity, margin_account, programs);
    seeds.push(vec![bump]);
    let seed_refs: Vec<&[u8]> = seeds.iter().map(|s| s.as_slice()).collect();
    let program = role.owner_program(programs);

    Pubkey::create_program_address(&seed_refs, &program).map_err(|e| {
        VaultError::AddressDerivationFailure(format!(
            "stored bump {} does not reproduce '{}' of {}: {}",
            bump, role, identity, e
        ))
    })
}

/// Margin account of a strategy on the venue:
/// `[venue_group, strategy_account, margin_account_num LE]` under the venue program
pub fn margin_account_address(
    strategy_account: &Pubkey,
    programs: &ProgramIds,
) -> Result<(Pubkey, u8)> {
    let account_num = programs.margin_account_num.to_le_bytes();
    Pubkey::try_find_program_address(
        &[
            programs.venue_group.as_ref(),
            strategy_account.as_ref(),
            &account_num,
        ],
        &programs.venue_program,
    )
    .ok_or_else(|| {
        VaultError::AddressDerivationFailure(format!(
            "no valid bump for margin account of {}",
            strategy_account
        ))
    })
}
