pub mod camera_background;
pub mod mesh;
pub mod model_pass;
pub mod renderer;
pub mod texture;
