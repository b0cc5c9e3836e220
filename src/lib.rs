pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod genai;
pub mod live;
pub mod tutoring;
pub mod voice;
