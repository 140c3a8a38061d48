// src/handlers/mod.rs

pub mod admin;
pub mod attempt;
pub mod auth;
pub mod credit;
pub mod question_set;
