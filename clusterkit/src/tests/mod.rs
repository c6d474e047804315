//! End to end scenarios over real stores

pub mod common;

mod appstore_tests;
