pub mod models;
pub mod db;
pub mod portfolio;
pub mod trades;
pub mod alerts;

pub use db::PortfolioDb;
pub use models::*;
pub use portfolio::PortfolioManager;
pub use trades::TradeLogger;
pub use alerts::AlertManager;
