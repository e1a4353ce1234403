mod bridge;
mod client;

pub use bridge::*;
pub use client::*;
