//! Camera Segment - Main Entry Point

use std::sync::Arc;

use camera_segment::settings::Settings;
use camera_segment::App;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const WINDOW_TITLE: &str = "Camera Segment";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 780;

/// Application state machine
enum AppState {
    /// Initial state before window is created
    Uninitialized { settings: Settings },
    /// Window and graphics context are ready
    Ready { window: Arc<Window>, app: App },
    /// Transitional state while initializing
    Initializing,
}

/// Main application handler implementing winit's ApplicationHandler trait
struct CameraSegmentApp {
    state: AppState,
}

impl CameraSegmentApp {
    fn new(settings: Settings) -> Self {
        Self {
            state: AppState::Uninitialized { settings },
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let AppState::Ready { app, .. } = &mut self.state {
            app.shutdown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for CameraSegmentApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // Only initialize if we haven't already
        if !matches!(self.state, AppState::Uninitialized { .. }) {
            return;
        }
        let AppState::Uninitialized { settings } =
            std::mem::replace(&mut self.state, AppState::Initializing)
        else {
            return;
        };

        log::info!("Creating window...");

        let window_attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .expect("Failed to create window"),
        );

        log::info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        log::info!("Initializing wgpu and egui...");
        let app = pollster::block_on(App::new(window.clone(), settings));

        log::info!("Camera Segment ready!");
        log::info!("Space to start/stop, C to switch camera, ESC to exit, F11 for fullscreen");

        window.request_redraw();
        self.state = AppState::Ready { window, app };
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let AppState::Ready { window, app } = &mut self.state else {
            return;
        };

        // Let egui handle the event first
        let egui_consumed = app.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting...");
                self.exit(event_loop);
            }

            // Handle keyboard input (only if egui doesn't want it)
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } if !egui_consumed => match key_code {
                KeyCode::Escape => {
                    log::info!("Escape pressed, exiting...");
                    self.exit(event_loop);
                }
                KeyCode::F11 => {
                    if window.fullscreen().is_some() {
                        window.set_fullscreen(None);
                        log::info!("Exiting fullscreen");
                    } else {
                        window.set_fullscreen(Some(winit::window::Fullscreen::Borderless(None)));
                        log::info!("Entering fullscreen");
                    }
                }
                KeyCode::Space => app.toggle_running(),
                KeyCode::KeyC => app.switch_camera(),
                _ => {}
            },

            WindowEvent::Resized(physical_size) => {
                app.resize(physical_size);
                window.request_redraw();
            }

            WindowEvent::RedrawRequested => {
                let reschedule = app.update();

                match app.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        log::warn!("Surface lost, reconfiguring...");
                        app.resize(app.size());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory!");
                        self.exit(event_loop);
                        return;
                    }
                    Err(e) => {
                        log::warn!("Surface error: {:?}", e);
                    }
                }

                // Next iteration on the next display refresh while running
                if reschedule {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Redraws are requested by the loop itself and by egui input
        event_loop.set_control_flow(ControlFlow::Wait);
    }
}

fn main() {
    let (settings, settings_error) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .init();

    log::info!("Camera Segment v{}", env!("CARGO_PKG_VERSION"));
    if let Some(e) = settings_error {
        log::warn!("Ignoring settings file, using defaults: {}", e);
    }

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = CameraSegmentApp::new(settings);
    event_loop.run_app(&mut app).expect("Event loop error");
}
