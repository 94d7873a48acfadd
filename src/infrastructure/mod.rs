pub mod frame;
pub mod spotify;
pub mod token_file;
