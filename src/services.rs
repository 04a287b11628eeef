pub mod billing_service;
pub mod document_service;
pub mod dues_service;
pub mod gateway;
pub mod payment_service;

pub use billing_service::BillingService;
pub use document_service::DocumentService;
pub use dues_service::DuesService;
pub use payment_service::{CheckoutConfig, PaymentService};
