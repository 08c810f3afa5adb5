// ============================================================================
// Domain Layer - records owned or mirrored by this service
// ============================================================================
//
// - customer/     - the customer record this service owns
// - projections/  - local copies of order and product identifiers
//
// ============================================================================

pub mod customer;
pub mod projections;

/// Identifier type shared with upstream services
pub type RecordId = i64;

pub use customer::{title_case, Address, Company, Customer, CustomerInput, NewCustomer, Profile};
pub use projections::{Order, Product};
