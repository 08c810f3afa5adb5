mod customer;

pub use customer::{CustomerService, ServiceError};
