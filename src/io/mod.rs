#[cfg(feature = "io_ply")]
pub mod ply;
