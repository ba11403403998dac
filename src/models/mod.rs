pub mod address;
pub mod quantity;
pub mod transaction;

pub use address::{validate_address, Address, AddressValidationError};
pub use quantity::{parse_hex_u64, QuantityError, Wei};
pub use transaction::{Direction, Transaction};
