pub mod driver;
pub mod presenter;
