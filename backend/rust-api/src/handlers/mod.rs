pub mod cash;
pub mod payments;
pub mod sales;
pub mod webhook;

pub use cash::pending_boxes;
pub use payments::{list_payments, sync_payments, SyncResponse};
pub use sales::{close_box, create_sale, list_sales, update_sale, CloseBoxResponse, CreateSaleRequest};
pub use webhook::{payment_webhook, WebhookResponse};
