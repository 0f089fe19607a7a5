//! Integration tests

mod common;
mod controller_test;
mod e2e_test;
mod market_test;
