pub mod admission;
pub mod background;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod hostname;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod replay;
pub mod session;
pub mod state;
