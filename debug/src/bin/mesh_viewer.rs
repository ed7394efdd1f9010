//! Interactive mesh viewer: orbit/WASD camera, click to select a sub-mesh,
//! E/Q to drive the explode animation, H to hide the selected sub-mesh.
//! Run from repo root: cargo run -p debug --bin mesh_viewer -- <asset-prefix>
//! Expects render-jobs/ and shaders/ next to the working directory.

use meshview_bridge::{MeshViewerWindowBackend, ViewerAssets};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use render_api::{DirLoader, FrameView, ViewerBackendWindow};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

const SCREEN_WIDTH: u32 = 512;
const SCREEN_HEIGHT: u32 = 512;
const PI: f32 = std::f32::consts::PI;

/// Build perspective projection matrix (column-major, WebGPU NDC z in [0,1]).
fn perspective_projection(fov_y_rad: f32, aspect: f32, near: f32, far: f32) -> [f32; 16] {
    let t = (fov_y_rad / 2.0).tan();
    let sy = 1.0 / t;
    let sx = sy / aspect;
    let a = far / (near - far);
    let b = (near * far) / (near - far);
    [
        sx, 0.0, 0.0, 0.0,
        0.0, sy, 0.0, 0.0,
        0.0, 0.0, a, -1.0,
        0.0, 0.0, b, 0.0,
    ]
}

/// Build look-at view matrix (column-major). Camera at eye looking at center.
fn look_at(eye: [f32; 3], center: [f32; 3], up: [f32; 3]) -> [f32; 16] {
    let f = normalize([
        center[0] - eye[0],
        center[1] - eye[1],
        center[2] - eye[2],
    ]);
    let s = normalize(cross(f, up));
    let u = cross(s, f);
    let tx = -(s[0] * eye[0] + s[1] * eye[1] + s[2] * eye[2]);
    let ty = -(u[0] * eye[0] + u[1] * eye[1] + u[2] * eye[2]);
    let tz = f[0] * eye[0] + f[1] * eye[1] + f[2] * eye[2];
    [
        s[0], u[0], -f[0], 0.0, s[1], u[1], -f[1], 0.0, s[2], u[2], -f[2], 0.0, tx, ty, tz, 1.0,
    ]
}

/// Multiply two 4x4 column-major matrices: C = A * B.
fn mat4_mul(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let mut c = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            c[col * 4 + row] = a[row] * b[col * 4]
                + a[4 + row] * b[col * 4 + 1]
                + a[8 + row] * b[col * 4 + 2]
                + a[12 + row] * b[col * 4 + 3];
        }
    }
    c
}

fn rotate_x(angle: f32) -> [f32; 16] {
    let (s, c) = angle.sin_cos();
    [
        1.0, 0.0, 0.0, 0.0, 0.0, c, s, 0.0, 0.0, -s, c, 0.0, 0.0, 0.0, 0.0, 1.0,
    ]
}

fn rotate_y(angle: f32) -> [f32; 16] {
    let (s, c) = angle.sin_cos();
    [
        c, 0.0, -s, 0.0, 0.0, 1.0, 0.0, 0.0, s, 0.0, c, 0.0, 0.0, 0.0, 0.0, 1.0,
    ]
}

fn mul_point(m: &[f32; 16], p: [f32; 3]) -> [f32; 3] {
    [
        m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
        m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
        m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len > 1e-6 {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0, 0.0, -1.0]
    }
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Orbit camera: left-drag rotates the eye around the look-at point, WASD
/// translates both along the view axes.
struct OrbitCamera {
    position: [f32; 3],
    look_at: [f32; 3],
    up: [f32; 3],
    angle: [f32; 2],
    initial_offset: [f32; 3],
    speed: f32,
}

impl OrbitCamera {
    fn new() -> Self {
        let initial_position = [0.0, 0.0, 1.5];
        let initial_look_at = [0.0, 0.0, -100.0];
        Self {
            position: initial_position,
            look_at: initial_look_at,
            up: [0.0, 1.0, 0.0],
            angle: [0.0, 0.0],
            initial_offset: [
                initial_position[0] - initial_look_at[0],
                initial_position[1] - initial_look_at[1],
                initial_position[2] - initial_look_at[2],
            ],
            speed: 0.01,
        }
    }

    fn view_dir(&self) -> [f32; 3] {
        normalize([
            self.look_at[0] - self.position[0],
            self.look_at[1] - self.position[1],
            self.look_at[2] - self.position[2],
        ])
    }

    fn translate(&mut self, dir: [f32; 3], amount: f32) {
        for i in 0..3 {
            self.position[i] += dir[i] * amount;
            self.look_at[i] += dir[i] * amount;
        }
        if self.view_dir()[1].abs() >= 0.9 {
            self.up = [1.0, 0.0, 0.0];
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        let dir = self.view_dir();
        match key {
            KeyCode::KeyW => self.translate(dir, self.speed),
            KeyCode::KeyS => self.translate(dir, -self.speed),
            KeyCode::KeyA => {
                let tangent = cross(self.up, dir);
                self.translate(tangent, -self.speed);
            }
            KeyCode::KeyD => {
                let tangent = cross(self.up, dir);
                self.translate(tangent, self.speed);
            }
            _ => {}
        }
    }

    fn rotate(&mut self, dx: f32, dy: f32) {
        let rotation_speed = 0.3;
        let delta = (2.0 * PI) / SCREEN_WIDTH as f32;
        self.angle[1] += -dx * rotation_speed * delta;
        self.angle[0] += dy * rotation_speed * delta;
        if self.angle[1] < 0.0 {
            self.angle[1] += 2.0 * PI;
        }
        if self.angle[1] > 2.0 * PI {
            self.angle[1] -= 2.0 * PI;
        }
        self.angle[0] = self.angle[0].clamp(-PI * 0.5, PI * 0.5);

        let rotation = mat4_mul(&rotate_y(self.angle[1]), &rotate_x(self.angle[0]));
        let eye = mul_point(&rotation, self.initial_offset);
        self.position = [
            eye[0] + self.look_at[0],
            eye[1] + self.look_at[1],
            eye[2] + self.look_at[2],
        ];
    }

    fn frame_view(&self, prev_view_proj: [f32; 16], viewport: (u32, u32)) -> FrameView {
        let view = look_at(self.position, self.look_at, self.up);
        let projection = perspective_projection(PI * 0.5, 1.0, 0.3, 100.0);
        let view_projection = mat4_mul(&projection, &view);
        FrameView {
            view_matrix: view,
            projection_matrix: projection,
            view_projection_matrix: view_projection,
            prev_view_projection_matrix: prev_view_proj,
            camera_position: self.position,
            camera_look_at: self.look_at,
            viewport_size: viewport,
        }
    }
}

struct App {
    assets: ViewerAssets,
    window: Option<winit::window::Window>,
    backend: Option<Box<dyn ViewerBackendWindow>>,
    camera: OrbitCamera,
    prev_view_proj: [f32; 16],
    explosion: f32,
    left_held: bool,
    dragged: bool,
    cursor: (f64, f64),
    last_cursor: Option<(f64, f64)>,
    last_selection: i32,
}

impl App {
    fn new(assets: ViewerAssets) -> Self {
        Self {
            assets,
            window: None,
            backend: None,
            camera: OrbitCamera::new(),
            prev_view_proj: perspective_projection(PI * 0.5, 1.0, 0.3, 100.0),
            explosion: 0.0,
            left_held: false,
            dragged: false,
            cursor: (0.0, 0.0),
            last_cursor: None,
            last_selection: -1,
        }
    }

    fn backend(&mut self) -> Option<&mut Box<dyn ViewerBackendWindow>> {
        if self.backend.is_none() {
            let window = self.window.as_ref()?;
            let loader = DirLoader::new(std::env::current_dir().ok()?);
            match MeshViewerWindowBackend::from_window(window, self.assets.clone(), &loader) {
                Ok(backend) => self.backend = Some(backend),
                Err(e) => {
                    eprintln!("backend setup failed: {e}");
                    return None;
                }
            }
        }
        self.backend.as_mut()
    }

    fn handle_key(&mut self, key: KeyCode) {
        self.camera.handle_key(key);
        match key {
            KeyCode::KeyE => {
                self.explosion += 0.5;
                if let Some(backend) = self.backend.as_mut() {
                    backend.set_explosion_multiplier(self.explosion);
                }
            }
            KeyCode::KeyQ => {
                self.explosion = (self.explosion - 0.5).max(0.0);
                if let Some(backend) = self.backend.as_mut() {
                    backend.set_explosion_multiplier(self.explosion);
                }
            }
            KeyCode::KeyH => {
                // Hide the selected sub-mesh via the visibility flags.
                if let Some(backend) = self.backend.as_mut() {
                    let selected = backend.selection_info().mesh_id;
                    if selected >= 0 {
                        let off = 0u32.to_le_bytes();
                        if let Err(e) =
                            backend.set_buffer_data("visibilityFlags", &off, selected as u64 * 4)
                        {
                            eprintln!("hide failed: {e}");
                        }
                    }
                }
            }
            KeyCode::KeyR => {
                if let Some(backend) = self.backend.as_mut() {
                    let flags: Vec<u8> = (0..backend.num_meshes())
                        .flat_map(|_| 1u32.to_le_bytes())
                        .collect();
                    if let Err(e) = backend.set_buffer_data("visibilityFlags", &flags, 0) {
                        eprintln!("reset visibility failed: {e}");
                    }
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = winit::window::WindowAttributes::default()
            .with_title("Mesh Viewer")
            .with_inner_size(winit::dpi::PhysicalSize::new(SCREEN_WIDTH, SCREEN_HEIGHT))
            .with_resizable(false);
        let window = event_loop.create_window(attrs).expect("create window");
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    if let PhysicalKey::Code(code) = event.physical_key {
                        self.handle_key(code);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    match state {
                        ElementState::Pressed => {
                            self.left_held = true;
                            self.dragged = false;
                        }
                        ElementState::Released => {
                            self.left_held = false;
                            self.last_cursor = None;
                            if !self.dragged {
                                let (x, y) = self.cursor;
                                if let Some(backend) = self.backend.as_mut() {
                                    backend.highlight_selected_mesh(x as i32, y as i32);
                                }
                            }
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                if self.left_held {
                    let (last_x, last_y) = self.last_cursor.unwrap_or(self.cursor);
                    let dx = (position.x - last_x) as f32;
                    let dy = (position.y - last_y) as f32;
                    if dx != 0.0 || dy != 0.0 {
                        self.dragged = true;
                        self.camera.rotate(dx, dy);
                    }
                    self.last_cursor = Some(self.cursor);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(window) = &self.window else { return };
                let (raw_window, raw_display) =
                    match (window.window_handle(), window.display_handle()) {
                        (Ok(wh), Ok(dh)) => (wh.as_raw(), dh.as_raw()),
                        _ => return,
                    };
                let size = window.inner_size();
                let viewport = (size.width.max(1), size.height.max(1));
                let view = self.camera.frame_view(self.prev_view_proj, viewport);
                self.prev_view_proj = view.view_projection_matrix;
                if let Some(backend) = self.backend() {
                    if let Err(e) = backend.draw_frame_to_window(&view, raw_window, raw_display) {
                        eprintln!("draw failed: {e}");
                    }
                    let info = backend.selection_info();
                    if info.mesh_id != self.last_selection {
                        self.last_selection = info.mesh_id;
                        if info.mesh_id >= 0 {
                            println!(
                                "selected mesh {} at ({}, {}) min {:?} max {:?}",
                                info.mesh_id,
                                info.coord.0,
                                info.coord.1,
                                info.min_position,
                                info.max_position
                            );
                        } else {
                            println!("selection cleared");
                        }
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), String> {
    env_logger::init();
    let prefix = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "assets/scene".to_string());
    let assets = ViewerAssets {
        screen_width: SCREEN_WIDTH,
        screen_height: SCREEN_HEIGHT,
        mesh_file_prefix: prefix,
        pipeline_file_path: "render-jobs/mesh-viewer.json".to_string(),
    };
    let event_loop = winit::event_loop::EventLoop::new().map_err(|e| e.to_string())?;
    let mut app = App::new(assets);
    event_loop.run_app(&mut app).map_err(|e| e.to_string())?;
    Ok(())
}
