#[macro_use]
extern crate serde;

mod authz;
mod custodian;
mod decryption;
mod error;
mod keygen;
mod ledger;
mod store;
mod tally;
mod util;
mod vote;

pub use authz::*;
pub use custodian::*;
pub use decryption::*;
pub use error::*;
pub use keygen::*;
pub use ledger::*;
pub use store::*;
pub use tally::*;
pub use util::*;
pub use vote::*;
