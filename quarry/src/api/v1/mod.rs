pub mod dto;
pub mod handlers;
pub mod middleware;
mod router;

pub use router::v1_router;
