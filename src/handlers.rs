pub mod billing;
pub mod dues;
pub mod members;
pub mod payments;
