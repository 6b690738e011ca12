pub mod bind_group_builder;
pub mod imgui_renderer;
pub mod passes;
pub mod render_common;
pub mod render_material_manager;
pub mod render_model;
pub mod renderer;
pub mod shader_loader;
pub mod texture;
