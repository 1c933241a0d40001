//! External system clients.
//!
//! Every external surface sits behind a trait: the marketplace API, the
//! ERP RPC endpoint and the notification webhook. HTTP implementations
//! live next to in-memory doubles the engine tests run against. All
//! calls may block on the network; retries and throttling are explicit
//! and live at the call site.

pub mod erp;
pub mod error;
pub mod marketplace;
pub mod notify;
pub mod retry;
pub mod throttle;

pub use erp::{relation_id, ErpClient, ErpHttpConfig, InMemoryErp, JsonRpcErpClient};
pub use error::{ConnectorError, Result};
pub use marketplace::{
    HttpMarketplaceClient, InMemoryMarketplaceClient, MarketplaceClient, MarketplaceHttpConfig,
    ReportPoller, ReportState,
};
pub use notify::{CaptureNotifier, Notifier, WebhookNotifier};
pub use retry::RetryPolicy;
pub use throttle::CallThrottle;
