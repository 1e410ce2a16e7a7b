pub mod constants;
pub mod error;
pub mod measurement;
pub mod packet;
pub mod protocol;
pub mod session;

// Re-export the Session struct for easy access
pub use session::Session;
