pub mod address_book;
pub mod pda;

pub use address_book::{AddressBook, AddressBumps};
pub use pda::{derive, margin_account_address, recreate, DerivedAddress, ProgramIds, Role};
