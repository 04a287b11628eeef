pub mod auth;
pub mod billing;
pub mod dues;
pub mod member;
pub mod payments;
