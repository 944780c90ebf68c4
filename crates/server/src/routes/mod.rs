pub mod customer;
pub mod status;
