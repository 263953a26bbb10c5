use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::Parser;
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, KeyCode, NamedKey, PhysicalKey},
    window::{Window, WindowId},
};

use chip8_vm::{
    DEFAULT_SPEED, DISPLAY_X, DISPLAY_Y, FrameClock, Interpreter,
    devices::{KeyState, PixelGrid, ToneGenerator},
    u4,
};

const WINDOW_SCALE: u32 = 10;

const PIXEL_ON: [u8; 4] = [0x32, 0xFF, 0x66, 0xFF];
const PIXEL_OFF: [u8; 4] = [0x00, 0x00, 0x00, 0xFF];

/// Mapping from physical keyboard keys to the hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x0
    KeyCode::Digit1, // 0x1
    KeyCode::Digit2, // 0x2
    KeyCode::Digit3, // 0x3
    KeyCode::KeyQ,   // 0x4
    KeyCode::KeyW,   // 0x5
    KeyCode::KeyE,   // 0x6
    KeyCode::KeyA,   // 0x7
    KeyCode::KeyS,   // 0x8
    KeyCode::KeyD,   // 0x9
    KeyCode::KeyZ,   // 0xA
    KeyCode::KeyC,   // 0xB
    KeyCode::Digit4, // 0xC
    KeyCode::KeyR,   // 0xD
    KeyCode::KeyF,   // 0xE
    KeyCode::KeyV,   // 0xF
];

/// Square-wave beeper on a rodio sink.
struct Beeper {
    /// Owns the audio device; the sink goes silent if this is dropped.
    _stream: OutputStream,
    sink: Sink,
    frequency: Option<f32>,
}

impl Beeper {
    fn new() -> anyhow::Result<Self> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open audio output stream")?;
        stream.log_on_drop(false);

        let sink = Sink::connect_new(stream.mixer());
        sink.pause();

        Ok(Self {
            _stream: stream,
            sink,
            frequency: None,
        })
    }
}

impl ToneGenerator for Beeper {
    fn start(&mut self, frequency_hz: f32) {
        if self.frequency != Some(frequency_hz) {
            self.sink.clear();
            self.sink.append(SquareWave::new(frequency_hz).amplify(0.25));
            self.frequency = Some(frequency_hz);
        }
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.pause();
    }
}

struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,

    machine: Interpreter<PixelGrid, KeyState, Beeper>,
    clock: FrameClock,
    last_redraw: Instant,

    /// Result to surface from main once the event loop exits.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn new(rom: &[u8], speed: u32) -> anyhow::Result<Self> {
        let beeper = Beeper::new()?;

        let mut machine = Interpreter::new(PixelGrid::new(), KeyState::new(), beeper);
        machine.speed = speed;
        machine
            .load_program(rom)
            .context("Failed to load program image")?;

        Ok(Self {
            window: None,
            pixels: None,
            machine,
            clock: FrameClock::new(),
            last_redraw: Instant::now(),
            exit_result: Ok(()),
        })
    }

    fn rasterize(&mut self) {
        let frame = self.pixels.as_mut().unwrap().frame_mut();
        let grid = self.machine.framebuffer.pixels();

        for (cell, on) in frame.chunks_exact_mut(4).zip(grid.iter().flatten()) {
            cell.copy_from_slice(if *on { &PIXEL_ON } else { &PIXEL_OFF });
        }
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let size = LogicalSize::new(
            DISPLAY_X as u32 * WINDOW_SCALE,
            DISPLAY_Y as u32 * WINDOW_SCALE,
        );
        let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("chip8-vm")
                        .with_inner_size(size)
                        .with_min_inner_size(min_size),
                )
                .context("Failed to create window")?,
        );

        let window_size = window.inner_size();
        let surface = SurfaceTexture::new(window_size.width, window_size.height, window.clone());
        let pixels = Pixels::new(DISPLAY_X as u32, DISPLAY_Y as u32, surface)
            .context("Failed to create pixel surface")?;

        window.request_redraw();
        self.window = Some(window);
        self.pixels = Some(pixels);

        // Avoid a catch-up burst on the first redraw
        self.last_redraw = Instant::now();
        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                self.pixels
                    .as_mut()
                    .unwrap()
                    .resize_surface(size.width, size.height)
                    .context("Failed to resize pixel surface")?;
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_redraw).as_secs_f32();
                self.last_redraw = now;

                for _ in 0..self.clock.advance(dt) {
                    self.machine.run_frame().context("Emulation fault")?;
                }

                self.rasterize();
                self.pixels
                    .as_ref()
                    .unwrap()
                    .render()
                    .context("Render error")?;

                self.window.as_ref().unwrap().request_redraw();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key
                    && let Some(key) = KEY_MAP.iter().position(|&k| k == code)
                {
                    let key = u4::new(key as u8);
                    match event.state {
                        ElementState::Pressed => self.machine.press_key(key),
                        ElementState::Released => self.machine.release_key(key),
                    }
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }
}

/// Windowed CHIP-8 virtual machine.
///
/// Keys 1-4, Q-R, A-F, Z-V map to the hex keypad.
/// Escape exits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the program image (ROM) to run
    rom_path: PathBuf,

    /// Instructions executed per 60 Hz frame
    #[arg(long, default_value_t = DEFAULT_SPEED)]
    speed: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read program image")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(&rom, args.speed).context("Failed to initialize application")?;
    event_loop.run_app(&mut app).context("Event loop error")?;

    app.exit_result
}
