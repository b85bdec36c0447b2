mod client;

pub use client::{CohereClient, DEFAULT_BASE_URL};
