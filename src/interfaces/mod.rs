//! Inbound adapters translating external input into use-case calls.

pub mod csv;
