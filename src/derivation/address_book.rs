use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::pda::{self, DerivedAddress, ProgramIds, Role};
use crate::error::{Result, VaultError};

/// Bumps needed to re-derive every sub-account of one vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressBumps {
    pub vault_bump: u8,
    pub mint_bump: u8,
    pub account_bump: u8,
    pub open_orders_bump: u8,
}

impl AddressBumps {
    pub fn get(&self, role: Role) -> u8 {
        match role {
            Role::VaultTokenAccount => self.vault_bump,
            Role::ShareMint => self.mint_bump,
            Role::StrategyAccount => self.account_bump,
            Role::OpenOrders => self.open_orders_bump,
        }
    }

    fn set(&mut self, role: Role, bump: u8) {
        match role {
            Role::VaultTokenAccount => self.vault_bump = bump,
            Role::ShareMint => self.mint_bump = bump,
            Role::StrategyAccount => self.account_bump = bump,
            Role::OpenOrders => self.open_orders_bump = bump,
        }
    }
}

/// Arena of derived addresses keyed by `(seed owner, role)`.
///
/// The seed owner is the identity for vault-program roles and the margin
/// account for `OpenOrders`, matching what each address is actually derived
/// from. `claim` reserves every sub-account of an identity so the identity can
/// be initialized only once.
pub struct AddressBook {
    programs: ProgramIds,
    entries: HashMap<(Pubkey, Role), DerivedAddress>,
    /// identity -> addresses it holds
    claims: HashMap<Pubkey, Vec<Pubkey>>,
    claimed: HashSet<Pubkey>,
}

fn seed_owner(identity: &Pubkey, role: Role, margin_account: &Pubkey) -> Pubkey {
    match role {
        Role::OpenOrders => *margin_account,
        _ => *identity,
    }
}

impl AddressBook {
    pub fn new(programs: ProgramIds) -> Self {
        Self {
            programs,
            entries: HashMap::new(),
            claims: HashMap::new(),
            claimed: HashSet::new(),
        }
    }

    pub fn programs(&self) -> &ProgramIds {
        &self.programs
    }

    fn lookup_or_derive(
        &self,
        identity: &Pubkey,
        role: Role,
        margin_account: &Pubkey,
    ) -> Result<DerivedAddress> {
        let key = (seed_owner(identity, role, margin_account), role);
        if let Some(cached) = self.entries.get(&key) {
            return Ok(DerivedAddress {
                identity: *identity,
                ..*cached
            });
        }

        let derived = pda::derive(identity, role, margin_account, &self.programs)?;
        debug!(
            identity = %identity,
            role = %role,
            address = %derived.address,
            bump = derived.bump,
            "derived sub-account"
        );
        Ok(derived)
    }

    fn store(&mut self, derived: DerivedAddress, margin_account: &Pubkey) {
        let key = (
            seed_owner(&derived.identity, derived.role, margin_account),
            derived.role,
        );
        self.entries.insert(key, derived);
    }

    /// Derive (or look up) one sub-account
    pub fn resolve(
        &mut self,
        identity: &Pubkey,
        role: Role,
        margin_account: &Pubkey,
    ) -> Result<DerivedAddress> {
        let derived = self.lookup_or_derive(identity, role, margin_account)?;
        self.store(derived, margin_account);
        Ok(derived)
    }

    /// Derive every role for an identity and return the bump table
    pub fn resolve_all(&mut self, identity: &Pubkey, margin_account: &Pubkey) -> Result<AddressBumps> {
        let mut bumps = AddressBumps::default();
        for role in Role::ALL {
            let derived = self.resolve(identity, role, margin_account)?;
            bumps.set(role, derived.bump);
        }
        Ok(bumps)
    }

    /// Reserve every sub-account of an identity.
    ///
    /// Fails with `AlreadyInitialized` if the identity or any of its derived
    /// addresses is already claimed; the book is unchanged in that case.
    pub fn claim(&mut self, identity: &Pubkey, margin_account: &Pubkey) -> Result<AddressBumps> {
        if self.claims.contains_key(identity) || self.claimed.contains(identity) {
            return Err(VaultError::AlreadyInitialized(*identity));
        }

        let mut derived = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            derived.push(self.lookup_or_derive(identity, role, margin_account)?);
        }
        if let Some(taken) = derived.iter().find(|d| self.claimed.contains(&d.address)) {
            debug!(
                identity = %identity,
                role = %taken.role,
                address = %taken.address,
                "sub-account already claimed"
            );
            return Err(VaultError::AlreadyInitialized(*identity));
        }

        let mut bumps = AddressBumps::default();
        let mut addresses = Vec::with_capacity(derived.len());
        for entry in derived {
            bumps.set(entry.role, entry.bump);
            addresses.push(entry.address);
            self.store(entry, margin_account);
        }
        self.claimed.insert(*identity);
        self.claimed.extend(addresses.iter().copied());
        self.claims.insert(*identity, addresses);
        Ok(bumps)
    }

    /// Undo a claim after a failed initialization
    pub fn release(&mut self, identity: &Pubkey) {
        if let Some(addresses) = self.claims.remove(identity) {
            self.claimed.remove(identity);
            for address in addresses {
                self.claimed.remove(&address);
            }
        }
    }

    pub fn is_claimed(&self, identity: &Pubkey) -> bool {
        self.claims.contains_key(identity)
    }

    /// Number of cached derivations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> AddressBook {
        AddressBook::new(ProgramIds {
            strategy_program: Pubkey::new_unique(),
            venue_program: Pubkey::new_unique(),
            venue_group: Pubkey::new_unique(),
            margin_account_num: 1,
            open_orders_sub_index: 2,
        })
    }

    #[test]
    fn test_resolve_caches_entries() {
        let mut book = book();
        let identity = Pubkey::new_unique();
        let margin = Pubkey::new_unique();

        let first = book.resolve(&identity, Role::ShareMint, &margin).unwrap();
        let second = book.resolve(&identity, Role::ShareMint, &margin).unwrap();
        assert_eq!(first, second);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_bump_table_reproduces_addresses() {
        let mut book = book();
        let identity = Pubkey::new_unique();
        let margin = Pubkey::new_unique();
        let programs = *book.programs();

        let bumps = book.resolve_all(&identity, &margin).unwrap();
        for role in Role::ALL {
            let derived = book.resolve(&identity, role, &margin).unwrap();
            assert_eq!(derived.bump, bumps.get(role));
            let rebuilt = pda::recreate(&identity, role, &margin, bumps.get(role), &programs).unwrap();
            assert_eq!(rebuilt, derived.address);
        }
    }

    #[test]
    fn test_claim_once_per_identity() {
        let mut book = book();
        let identity = Pubkey::new_unique();
        let margin = Pubkey::new_unique();

        assert!(book.claim(&identity, &margin).is_ok());
        assert!(book.is_claimed(&identity));
        assert!(matches!(
            book.claim(&identity, &margin),
            Err(VaultError::AlreadyInitialized(id)) if id == identity
        ));

        book.release(&identity);
        assert!(!book.is_claimed(&identity));
        assert!(book.claim(&identity, &margin).is_ok());
    }

    #[test]
    fn test_shared_margin_account_collides() {
        let mut book = book();
        let margin = Pubkey::new_unique();

        // Two identities pointed at one margin account share an open-orders address
        assert!(book.claim(&Pubkey::new_unique(), &margin).is_ok());
        let second = Pubkey::new_unique();
        assert!(matches!(
            book.claim(&second, &margin),
            Err(VaultError::AlreadyInitialized(_))
        ));
        assert!(!book.is_claimed(&second));
    }

    #[test]
    fn test_retry_after_collision_with_fresh_margin_account() {
        let mut book = book();
        let shared = Pubkey::new_unique();
        assert!(book.claim(&Pubkey::new_unique(), &shared).is_ok());

        let second = Pubkey::new_unique();
        let entries = book.len();
        assert!(book.claim(&second, &shared).is_err());
        assert_eq!(book.len(), entries);

        let fresh = Pubkey::new_unique();
        let bumps = book.claim(&second, &fresh).unwrap();
        let programs = *book.programs();
        let open_orders = pda::derive(&second, Role::OpenOrders, &fresh, &programs).unwrap();
        assert_eq!(bumps.get(Role::OpenOrders), open_orders.bump);
        assert_eq!(
            book.resolve(&second, Role::OpenOrders, &fresh).unwrap().address,
            open_orders.address
        );
        assert!(book.is_claimed(&second));
    }

    #[test]
    fn test_release_then_reclaim_keeps_cache_bounded() {
        let mut book = book();
        let identity = Pubkey::new_unique();
        let margin = Pubkey::new_unique();

        for _ in 0..3 {
            book.claim(&identity, &margin).unwrap();
            book.release(&identity);
        }
        assert_eq!(book.len(), Role::ALL.len());
        assert!(!book.is_claimed(&identity));
    }
}
