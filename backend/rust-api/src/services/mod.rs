pub mod boxes;
pub mod mercadopago;
pub mod reconciliation;
pub mod sale_ledger;

pub use boxes::{BoxAggregator, PendingBox};
pub use mercadopago::{GatewayError, GatewayPayment, MercadoPagoClient, PaymentGateway, SearchWindow};
pub use reconciliation::{ReconcileError, ReconciliationEngine, WebhookAck};
pub use sale_ledger::{LedgerError, SaleLedger};
