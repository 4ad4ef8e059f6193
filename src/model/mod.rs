pub mod booking;
pub mod customer;
pub mod fleet;
pub mod invoice;
pub mod leg;
pub mod price;
