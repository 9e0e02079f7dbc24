pub mod client;
pub mod models;

pub use broker_trait::BrokerClient;
pub use client::IbkrClient;
pub use models::*;
