//! Repositories are unit structs whose associated functions take the pool
//! explicitly.

pub mod generated_video_repo;
pub mod user_repo;

pub use generated_video_repo::GeneratedVideoRepo;
pub use user_repo::UserRepo;
