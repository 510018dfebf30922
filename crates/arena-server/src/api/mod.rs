//! API handlers

pub mod admin;
pub mod auth;
pub mod competitions;
pub mod entries;
pub mod feed;
pub mod rankings;
pub mod wallets;
