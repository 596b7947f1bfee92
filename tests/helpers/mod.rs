#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{ConsentBuilder, PurposeBuilder};
pub use db::{TestDb, TestEnv, NOW};
