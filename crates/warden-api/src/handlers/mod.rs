//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod data;
pub mod health;
pub mod users;
