pub mod credential;
pub mod redirect;
pub mod track;
pub mod view;
