// src/models/mod.rs

pub mod attempt;
pub mod credit;
pub mod question_set;
pub mod user;
