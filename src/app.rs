//! Application state holding the wgpu graphics context
//!
//! Owns the surface, device and egui integration, plus the [`Session`] that
//! drives capture and segmentation. The video and overlay are uploaded as
//! egui textures and drawn stacked in the central panel.

use std::sync::Arc;
use std::time::Instant;

use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::camera::{CaptureController, NokhwaBackend};
use crate::ml;
use crate::overlay::fit_to_viewport;
use crate::session::{Session, TickOutcome};
use crate::settings::Settings;

/// Main application state
pub struct App {
    /// Reference to the window
    window: Arc<Window>,
    /// The wgpu surface for presenting rendered frames
    surface: wgpu::Surface<'static>,
    /// The wgpu device for creating GPU resources
    device: wgpu::Device,
    /// The command queue for submitting GPU work
    queue: wgpu::Queue,
    /// Surface configuration
    config: wgpu::SurfaceConfiguration,
    /// Current window size in physical pixels
    size: PhysicalSize<u32>,

    // Capture, inference and overlay
    session: Session<NokhwaBackend>,
    settings: Settings,

    // Textures shown in the central panel
    video_texture: Option<egui::TextureHandle>,
    overlay_texture: Option<egui::TextureHandle>,
    last_video_frame: Option<u64>,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // Frame timing
    fps: f64,
    last_fps_update: Instant,
    frames_since_update: u64,
}

impl App {
    /// Create a new App instance with initialized wgpu context
    pub async fn new(window: Arc<Window>, settings: Settings) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("Failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find suitable GPU adapter");

        log::info!("Using GPU: {}", adapter.get_info().name);
        log::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Camera Segment Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);

        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        log::info!("Surface format: {:?}", surface_format);

        // Presentation paces the loop, one iteration per display refresh
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 1,
        };

        surface.configure(&device, &config);

        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        let capture = CaptureController::new(NokhwaBackend, settings.stream_request());

        Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            session: Session::new(capture),
            settings,
            video_texture: None,
            overlay_texture: None,
            last_video_frame: None,
            egui_ctx,
            egui_state,
            egui_renderer,
            fps: 0.0,
            last_fps_update: Instant::now(),
            frames_since_update: 0,
        }
    }

    /// Handle a window event, returning true if egui consumed it
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        if response.repaint {
            self.window.request_redraw();
        }
        response.consumed
    }

    /// Resize the surface
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Get current size
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Start or stop the camera and render loop
    pub fn toggle_running(&mut self) {
        let settings = &self.settings;
        self.session.toggle(|| ml::load_model(settings));

        if !self.session.is_running() {
            self.video_texture = None;
            self.overlay_texture = None;
            self.last_video_frame = None;
        }
        self.window.request_redraw();
    }

    /// Switch between front and back camera
    pub fn switch_camera(&mut self) {
        self.session.switch_camera();
        self.last_video_frame = None;
        self.window.request_redraw();
    }

    /// Run one loop iteration and upload its output.
    ///
    /// Returns whether the loop should be scheduled again.
    pub fn update(&mut self) -> bool {
        let outcome = self.session.tick();

        if matches!(
            outcome,
            TickOutcome::Mask | TickOutcome::Placeholder | TickOutcome::InferenceFailed
        ) {
            self.upload_textures();
        }

        outcome.reschedule()
    }

    fn upload_textures(&mut self) {
        if let Some(frame) = self.session.frame() {
            if self.last_video_frame != Some(frame.frame_number) {
                let image = egui::ColorImage::from_rgba_unmultiplied(
                    [frame.width as usize, frame.height as usize],
                    &frame.data,
                );
                set_texture(&self.egui_ctx, &mut self.video_texture, "camera-video", image);
                self.last_video_frame = Some(frame.frame_number);
            }
        }

        let canvas = self.session.canvas();
        if canvas.width() > 0 && canvas.height() > 0 {
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [canvas.width() as usize, canvas.height() as usize],
                canvas.as_raw(),
            );
            set_texture(&self.egui_ctx, &mut self.overlay_texture, "segment-overlay", image);
        }
    }

    /// Persist settings that change at runtime
    pub fn shutdown(&mut self) {
        self.settings.initial_facing = self.session.facing();
        if let Err(e) = self.settings.save() {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    /// Render a frame
    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.render_ui(&mut encoder, &view);

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        self.update_fps();

        Ok(())
    }

    fn render_ui(&mut self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let raw_input = self.egui_state.take_egui_input(&self.window);

        // Get UI state before running egui
        let button_label = self.session.state().button_label();
        let facing = self.session.facing();
        let status = self.session.status_text();
        let fps = self.fps;
        let is_running = self.session.is_running();
        let alert = self.session.alert().map(str::to_owned);
        let video_size = self.session.frame().map(|f| (f.width, f.height));
        let orientation = self.session.orientation();
        let video_id = self.video_texture.as_ref().map(|t| t.id());
        let overlay_id = self.overlay_texture.as_ref().map(|t| t.id());

        // Run egui with a closure that doesn't borrow self
        let mut toggle_running = false;
        let mut switch_camera = false;
        let mut dismiss_alert = false;

        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label("Camera Segment");
                    ui.separator();
                    if ui.button(button_label).clicked() {
                        toggle_running = true;
                    }
                    if ui
                        .button(format!("Switch camera ({})", facing.display_name()))
                        .clicked()
                    {
                        switch_camera = true;
                    }
                    ui.separator();
                    ui.label(&status);
                    if is_running {
                        ui.separator();
                        ui.label(format!("FPS: {:.1}", fps));
                    }
                });
            });

            egui::CentralPanel::default()
                .frame(egui::Frame::default().fill(egui::Color32::BLACK))
                .show(ctx, |ui| {
                    let available = ui.available_rect_before_wrap();
                    match (video_size, video_id) {
                        (Some(video), Some(video_id)) => {
                            let viewport = (available.width(), available.height());
                            let (w, h) = fit_to_viewport(video, viewport, orientation);
                            let rect = egui::Rect::from_center_size(
                                available.center(),
                                egui::vec2(w, h),
                            );
                            let uv = egui::Rect::from_min_max(
                                egui::pos2(0.0, 0.0),
                                egui::pos2(1.0, 1.0),
                            );
                            let painter = ui.painter_at(available);
                            painter.image(video_id, rect, uv, egui::Color32::WHITE);
                            if let Some(overlay_id) = overlay_id {
                                painter.image(overlay_id, rect, uv, egui::Color32::WHITE);
                            }
                        }
                        _ => {
                            ui.centered_and_justified(|ui| {
                                let hint = if is_running {
                                    "Waiting for camera..."
                                } else {
                                    "Press Start to open the camera"
                                };
                                ui.label(hint);
                            });
                        }
                    }
                });

            if let Some(message) = &alert {
                egui::Modal::new(egui::Id::new("camera_alert")).show(ctx, |ui| {
                    ui.heading("Camera error");
                    ui.label(message);
                    ui.add_space(8.0);
                    if ui.button("OK").clicked() {
                        dismiss_alert = true;
                    }
                });
            }
        });

        // Apply UI actions
        if dismiss_alert {
            self.session.dismiss_alert();
        }
        if toggle_running {
            self.toggle_running();
        }
        if switch_camera {
            self.switch_camera();
        }

        self.egui_state.handle_platform_output(&self.window, full_output.platform_output);

        let paint_jobs = self.egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut render_pass = render_pass.forget_lifetime();
            self.egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }

    fn update_fps(&mut self) {
        self.frames_since_update += 1;

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f64();
        if elapsed >= 1.0 {
            self.fps = self.frames_since_update as f64 / elapsed;
            self.frames_since_update = 0;
            self.last_fps_update = now;
        }
    }
}

fn set_texture(
    ctx: &egui::Context,
    slot: &mut Option<egui::TextureHandle>,
    name: &str,
    image: egui::ColorImage,
) {
    match slot {
        Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
        None => *slot = Some(ctx.load_texture(name, image, egui::TextureOptions::LINEAR)),
    }
}
