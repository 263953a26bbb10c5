use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    DEFAULT_SPEED, DISPLAY_X, DISPLAY_Y, FrameClock, Interpreter, VmError,
    devices::{KeyState, PixelGrid, ToneGenerator},
    u4,
};

const KEY_MAP: [KeyCode; 16] = [
    KeyCode::Char('x'), // 0x0
    KeyCode::Char('1'), // 0x1
    KeyCode::Char('2'), // 0x2
    KeyCode::Char('3'), // 0x3
    KeyCode::Char('q'), // 0x4
    KeyCode::Char('w'), // 0x5
    KeyCode::Char('e'), // 0x6
    KeyCode::Char('a'), // 0x7
    KeyCode::Char('s'), // 0x8
    KeyCode::Char('d'), // 0x9
    KeyCode::Char('z'), // 0xA
    KeyCode::Char('c'), // 0xB
    KeyCode::Char('4'), // 0xC
    KeyCode::Char('r'), // 0xD
    KeyCode::Char('f'), // 0xE
    KeyCode::Char('v'), // 0xF
];

// Key release events are not fired in terminals on Linux.
// To handle this, we implement a timeout after which we consider a key released.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

/// Terminals have no audio path worth relying on; the tone generator is a
/// beep indicator drawn in the status bar instead.
struct BeepLight {
    on: bool,
}

impl ToneGenerator for BeepLight {
    fn start(&mut self, _frequency_hz: f32) {
        self.on = true;
    }

    fn stop(&mut self) {
        self.on = false;
    }
}

struct App {
    machine: Interpreter<PixelGrid, KeyState, BeepLight>,
    clock: FrameClock,
    last_tick: Instant,
    key_press_times: [Option<Instant>; 16],

    /// A fault halts emulation but leaves the UI up so it can be read.
    fault: Option<VmError>,
    should_quit: bool,
}

impl App {
    fn new(rom: &[u8], speed: u32) -> anyhow::Result<Self> {
        let mut machine = Interpreter::new(PixelGrid::new(), KeyState::new(), BeepLight { on: false });
        machine.speed = speed;
        machine
            .load_program(rom)
            .context("Failed to load program image")?;

        Ok(Self {
            machine,
            clock: FrameClock::new(),
            last_tick: Instant::now(),
            key_press_times: [None; 16],
            fault: None,
            should_quit: false,
        })
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            let dt = self.last_tick.elapsed().as_secs_f32();
            self.last_tick = Instant::now();

            if self.fault.is_none() {
                for _ in 0..self.clock.advance(dt) {
                    if let Err(e) = self.machine.run_frame() {
                        self.fault = Some(e);
                        break;
                    }
                }
            }

            terminal.draw(|frame| self.draw(frame))?;

            self.check_key_timeout();

            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key_event(key);
                }
            }
        }

        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn check_key_timeout(&mut self) {
        let now = Instant::now();

        for (idx, press_time) in self.key_press_times.iter_mut().enumerate() {
            if let Some(time) = press_time
                && now.duration_since(*time) > KEY_RELEASE_TIMEOUT
            {
                *press_time = None;
                self.machine.release_key(u4::new(idx as u8));
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Esc
            || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
        {
            self.should_quit = true;
            return;
        }

        if let Some(idx) = KEY_MAP.iter().position(|&k| k == key.code) {
            self.machine.press_key(u4::new(idx as u8));
            self.key_press_times[idx] = Some(Instant::now());
        }
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + 15 + 2;
        const MIN_HEIGHT: u16 = DISPLAY_Y as u16 + 2 + 3;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let center = area.centered(Constraint::Length(45), Constraint::Length(3));

            Paragraph::new(format!(
                "Terminal is too small ({}x{} min)",
                MIN_WIDTH, MIN_HEIGHT
            ))
            .style(Style::default().fg(Color::Red))
            .alignment(Alignment::Center)
            .block(Block::bordered())
            .render(center, buf);

            return;
        }

        let [left, right] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(15 + 2),
        ])
        .areas(area);

        let [display, status] = Layout::vertical([
            Constraint::Length(DISPLAY_Y as u16 + 2),
            Constraint::Length(3),
        ])
        .areas(left);

        let [registers, keypad] = Layout::vertical([
            Constraint::Length(11 + 2),
            Constraint::Min(4 + 2),
        ])
        .areas(right);

        self.render_display(display, buf);
        self.render_status(status, buf);
        self.render_registers(registers, buf);
        self.render_keypad(keypad, buf);
    }
}

impl App {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let text: Vec<Line> = self
            .machine
            .framebuffer
            .pixels()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|pixel| {
                        Span::styled(
                            if *pixel { "█" } else { " " },
                            Style::default().fg(Color::Green),
                        )
                    })
                    .collect()
            })
            .collect();

        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Display "))
            .render(area, buf);
    }

    fn render_status(&self, area: Rect, buf: &mut Buffer) {
        let mut spans = match &self.fault {
            Some(e) => vec![Span::styled(
                format!("HALTED: {e}"),
                Style::default().fg(Color::Red),
            )],
            None => vec![Span::styled("RUNNING", Style::default().fg(Color::Green))],
        };

        if self.machine.tone.on {
            spans.push(Span::raw("  "));
            spans.push(Span::styled("♪ BEEP", Style::default().fg(Color::Yellow)));
        }

        spans.push(Span::raw("  (Esc quits)"));

        Paragraph::new(Line::from(spans))
            .block(Block::bordered().title(" State "))
            .render(area, buf);
    }

    fn render_registers(&self, area: Rect, buf: &mut Buffer) {
        let mut lines = Vec::new();

        lines.push(Line::from(format!(
            "PC: {:03X}  I: {:03X}",
            self.machine.pc, self.machine.i
        )));
        lines.push(Line::from(format!(
            "DT: {:02X}   ST: {:02X}",
            self.machine.delay_timer, self.machine.sound_timer
        )));
        lines.push(Line::from(""));

        let v = &self.machine.v;
        for idx in 0..8 {
            lines.push(Line::from(format!(
                "V{:X}: {:02X}   V{:X}: {:02X}",
                idx,
                v[idx],
                idx + 8,
                v[idx + 8]
            )));
        }

        Paragraph::new(lines)
            .block(Block::bordered().title(" Registers "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let pressed = self.machine.keypad.pressed();
        let layout = [
            [0x1, 0x2, 0x3, 0xC],
            [0x4, 0x5, 0x6, 0xD],
            [0x7, 0x8, 0x9, 0xE],
            [0xA, 0x0, 0xB, 0xF],
        ];

        let lines = layout
            .iter()
            .map(|row| {
                row.iter()
                    .map(|key| {
                        Span::styled(
                            format!("{:X}", key),
                            if pressed[*key] {
                                Style::default().fg(Color::Black).bg(Color::White)
                            } else {
                                Style::default()
                            },
                        )
                    })
                    .flat_map(|s| [s, Span::raw(" ")])
                    .take(row.len() * 2 - 1)
                    .collect()
            })
            .collect::<Vec<Line>>();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }
}


/// Terminal CHIP-8 virtual machine.
///
/// Keys 1-4, q-r, a-f, z-v map to the hex keypad. Escape exits.
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
    let mut app = App::new(&rom, args.speed).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}
