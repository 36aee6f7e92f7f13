pub mod auth;
pub mod client;
pub mod models;

pub use auth::CredentialProvider;
pub use client::GenerationClient;
