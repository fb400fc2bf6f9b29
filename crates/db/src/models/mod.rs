pub mod generated_video;
pub mod user;
