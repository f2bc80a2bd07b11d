pub mod dynamics;
pub mod steps;
