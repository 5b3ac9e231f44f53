//! Cypress - civic issue reporting backend
//!
//! Citizens submit reports about local problems (potholes, broken lights,
//! graffiti), pin them on a map and discuss them in comments; admins move
//! reports through their status lifecycle and moderate content.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
