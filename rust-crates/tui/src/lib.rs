pub mod client;
pub mod ui;
pub mod wallets;
