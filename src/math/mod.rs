pub mod bounds;
pub mod normalize;
