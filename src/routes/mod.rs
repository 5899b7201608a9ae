pub mod admin;
pub mod auth;
pub mod collector;
pub mod company;
mod listing;
pub mod partner;
pub mod reward;
pub mod user;
pub mod waste_request;
