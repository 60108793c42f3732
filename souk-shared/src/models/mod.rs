pub mod cart;
pub mod catalog;
pub mod claim;
pub mod notification;
pub mod order;
pub mod profile;
pub mod strike;
