use crate::{rendering::renderer::Renderer, viewer::ViewerState};

pub fn update(state: &mut ViewerState, renderer: &mut Renderer, ui: &mut imgui::Ui, dt: f32) {
    state.update(dt);

    if state.take_pending_upload() {
        renderer.upload_scene(&mut state.scene);
    }

    state.progress.draw_ui(ui, ui.io().display_size);
}
