//! Correios shipping for e-commerce orders: packs order items into boxes
//! within the service limits, quotes each box with the Correios
//! `CalcPrecoPrazo` web service and combines the quotes into a shipping price
//! and delivery range.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod carrier;
pub mod config;
pub mod correios;
pub mod model;
pub mod packer;
pub mod quote;
pub mod types;
