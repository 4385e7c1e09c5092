pub mod health;
pub mod push;
pub mod sse;
pub mod station;
pub mod subscription;
