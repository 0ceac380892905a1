//! # Telerad Billing
//!
//! 计费模块: 费率表、账单生成、支付网关适配与支付状态对账。

pub mod checkout;
pub mod gateway;
pub mod invoice;
pub mod rates;
pub mod reconcile;
pub mod store;

pub use checkout::{CheckoutResponse, CheckoutService};
pub use gateway::{
    parse_webhook_event, verify_webhook_signature, CheckoutSession, GatewayConfig,
    PaymentGateway, StripeGateway,
};
pub use invoice::InvoiceGenerator;
pub use rates::RateTable;
pub use reconcile::{decide, PaymentReconciler, ReconcileAction};
pub use store::PaymentStore;
