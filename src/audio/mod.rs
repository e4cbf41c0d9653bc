pub mod mixer;
pub mod player;
pub mod slot;
pub mod track;
pub(crate) mod transition;
