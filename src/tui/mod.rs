//! TUI module for the live check dashboard

mod proxy_checker;

pub use proxy_checker::ProxyCheckerApp;
