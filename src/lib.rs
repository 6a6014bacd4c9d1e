//! Banner lifecycle core for the Nanbakadai marketplace: cached home-page
//! banner reads, the admin write path, and the inline-image migration.

pub mod admin;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod home;
pub mod invalidation;
pub mod migration;
pub mod model;
pub mod services;
pub mod storage;

pub use error::{BannerError, Result};
