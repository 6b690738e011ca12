use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use glam::Vec2;
use imgui::{FontConfig, FontSource};
use imgui_winit_support::WinitPlatform;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, Event, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::{config::ViewerConfig, engine, rendering::renderer::Renderer, viewer::ViewerState};

struct ImguiState {
    context: imgui::Context,
    platform: WinitPlatform,
}

/// Time between redraws. The first tick after startup is zero.
#[derive(Default)]
struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    fn tick(&mut self, now: Instant) -> Duration {
        let delta = self
            .last
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last = Some(now);
        delta
    }
}

struct App {
    renderer: Option<Renderer>,
    state: ViewerState,
    window_size: (u32, u32),
    imgui: Option<ImguiState>,
    clock: FrameClock,
}

impl App {
    fn new(state: ViewerState, window_size: (u32, u32)) -> Self {
        Self {
            renderer: None,
            state,
            window_size,
            imgui: None,
            clock: FrameClock::default(),
        }
    }

    fn setup_imgui(&mut self, window: &Window) {
        let mut context = imgui::Context::create();
        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(
            context.io_mut(),
            window,
            imgui_winit_support::HiDpiMode::Default,
        );

        let font_size = 14.0;
        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                oversample_h: 1,
                pixel_snap_h: true,
                size_pixels: font_size,
                ..Default::default()
            }),
        }]);

        // Disable INI support because it's broken in the published version of imgui
        context.set_ini_filename(None);

        self.imgui = Some(ImguiState { context, platform });
    }

    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let (width, height) = self.window_size;
        let window_attributes = Window::default_attributes()
            .with_title(format!("stagehand ({:?})", self.state.config.preset))
            .with_inner_size(PhysicalSize::new(width, height));
        let window = event_loop
            .create_window(window_attributes)
            .context("Failed to create window")?;

        self.setup_imgui(&window);
        let imgui = self
            .imgui
            .as_mut()
            .context("Imgui context missing after setup")?;

        let renderer = pollster::block_on(Renderer::new(
            Arc::new(window),
            &self.state,
            &mut imgui.context,
        ))?;

        let size = renderer.size;
        self.state.camera.set_aspect(size.width, size.height);
        renderer.window.request_redraw();
        self.renderer = Some(renderer);

        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        if let Err(e) = self.create_renderer(event_loop) {
            log::error!("Failed to start renderer: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let (Some(imgui), Some(renderer)) = (self.imgui.as_mut(), self.renderer.as_mut()) else {
            return;
        };
        let wants_mouse = imgui.context.io().want_capture_mouse;

        match &event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                renderer.resize(*new_size);
                self.state.camera.set_aspect(new_size.width, new_size.height);
            }
            WindowEvent::RedrawRequested => {
                let delta_time = self.clock.tick(Instant::now());
                imgui.context.io_mut().update_delta_time(delta_time);

                renderer.window.request_redraw();

                if let Err(e) = imgui
                    .platform
                    .prepare_frame(imgui.context.io_mut(), &renderer.window)
                {
                    log::warn!("Failed to prepare Imgui frame: {}", e);
                }

                let ui = imgui.context.new_frame();

                engine::update(&mut self.state, renderer, ui, delta_time.as_secs_f32());

                imgui.platform.prepare_render(ui, &renderer.window);

                match renderer.render(&self.state) {
                    Ok(frame) => {
                        if let Err(e) = renderer.finish_frame(frame, &mut imgui.context) {
                            log::error!("{:#}", e);
                        }
                    }
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        renderer.resize(renderer.size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of memory");
                        event_loop.exit();
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        log::warn!("Timeout");
                    }
                    Err(other) => {
                        log::error!("Unexpected error: {:?}", other);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                // Releases always reach the controls so a drag can't get stuck.
                if !wants_mouse || *state == ElementState::Released {
                    self.state.controls.on_mouse_button(*button, *state);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.state.controls.on_cursor_moved(
                    Vec2::new(position.x as f32, position.y as f32),
                    renderer.size.height as f32,
                    &self.state.camera,
                );
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if !wants_mouse {
                    self.state.controls.on_scroll(delta);
                }
            }
            _ => (),
        }

        imgui.platform.handle_event::<()>(
            imgui.context.io_mut(),
            &renderer.window,
            &Event::WindowEvent { window_id, event },
        );
    }
}

pub async fn run(config: ViewerConfig, window_size: (u32, u32)) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;

    let aspect = window_size.0 as f32 / window_size.1.max(1) as f32;
    let state = ViewerState::new(config, aspect).context("Failed to create viewer state")?;

    let mut app = App::new(state, window_size);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_ignores_startup_time() {
        let mut clock = FrameClock::default();
        let start = Instant::now();

        assert_eq!(clock.tick(start + Duration::from_secs(5)), Duration::ZERO);
        assert_eq!(
            clock.tick(start + Duration::from_millis(5016)),
            Duration::from_millis(16)
        );
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut clock = FrameClock::default();
        let start = Instant::now() + Duration::from_secs(1);

        clock.tick(start);
        assert_eq!(clock.tick(start - Duration::from_millis(10)), Duration::ZERO);
    }
}
