pub mod group;
pub mod join;
