#[cfg(feature = "desktop")]
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infra;
pub mod logging;
#[cfg(feature = "desktop")]
pub mod platform;
#[cfg(feature = "desktop")]
pub mod ui;
pub mod usecase;

#[cfg(test)]
mod tests;
