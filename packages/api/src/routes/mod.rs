//! Saksflyt API: Route Handlers

pub mod applications;
pub mod users;
