pub mod change;
pub mod channel;
pub mod models;
pub mod normalize;
pub mod settings;
