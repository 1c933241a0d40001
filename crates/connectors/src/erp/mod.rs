//! ERP RPC client.

mod client;
mod http;
mod memory;

pub use client::{model, relation_id, ErpClient, ErpRecord};
pub use http::{ErpHttpConfig, JsonRpcErpClient};
pub use memory::InMemoryErp;
