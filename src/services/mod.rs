// src/services/mod.rs

pub mod attempt;
pub mod catalog;
pub mod expiry;
pub mod grading;
pub mod ledger;
pub mod purchase;
