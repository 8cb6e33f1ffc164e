pub mod health;
pub mod tile;
