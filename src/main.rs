mod alerts;
mod backend;
mod config;
mod session;
mod ui;

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use num_traits::FromPrimitive;
use timer_core::link::parse_row;
use timer_core::{is_finished, parse_link, CountdownAnchor, ParsedDuration, Signer};
use tracing_subscriber::EnvFilter;

use crate::alerts::{fire_alert, Note};
use crate::backend::{RowClient, RowRecord, TriageCategory};
use crate::config::Config;
use crate::session::{CountdownSource, DashboardSession};

const APP_NAME: &str = "triage-dash";
const TICK_MS: u64 = 1000;

#[derive(Debug, num_derive::FromPrimitive)]
enum AppOp {
    Redraw = 0,
    Refresh,
    Fetched,
    Pump,
    Quit,
}

#[derive(Debug, num_derive::FromPrimitive)]
enum PumpOp {
    Start = 0,
    Stop,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ViewMode {
    /// Columns A..K plus the category picker.
    Edit,
    /// Columns A..L, read only.
    View,
}

#[derive(Parser)]
#[command(name = APP_NAME, about = "Single-row patient triage dashboard")]
struct Cli {
    /// 1-based data row under the header
    #[arg(long, default_value = "1")]
    row: String,
    #[arg(long, value_enum, default_value_t = ViewMode::Edit)]
    mode: ViewMode,
    /// Submit a treatment category for the row before showing it
    #[arg(long, value_enum)]
    set: Option<TriageCategory>,
    /// Session id scoping countdown anchors
    #[arg(long)]
    session: Option<String>,
    /// Render one frame and exit
    #[arg(long)]
    once: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open a handoff link from another dashboard instance
    Open { link: String },
}

struct Launch {
    row: u32,
    mode: ViewMode,
    locked: bool,
    timer_token: Option<String>,
}

impl Launch {
    fn from_cli(cli: &Cli) -> Self {
        match &cli.command {
            Some(Command::Open { link }) => {
                let params = parse_link(link);
                let mode = if params.lock {
                    ViewMode::View
                } else {
                    params
                        .mode
                        .as_deref()
                        .and_then(|m| ViewMode::from_str(m, true).ok())
                        .unwrap_or(cli.mode)
                };
                Self {
                    row: params.row,
                    mode,
                    locked: params.lock,
                    timer_token: params.timer_token,
                }
            }
            None => Self {
                row: parse_row(&cli.row),
                mode: cli.mode,
                locked: false,
                timer_token: None,
            },
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

type Fetched = Result<RowRecord>;

struct TriageApp {
    config: Config,
    client: RowClient,
    session: DashboardSession,

    row: u32,
    mode: ViewMode,
    locked: bool,
    clear_between_frames: bool,

    record: Option<RowRecord>,
    countdown: CountdownSource,
    notes: Vec<Note>,

    main_tx: Sender<usize>,
    fetch_tx: Sender<Fetched>,
    fetch_rx: Receiver<Fetched>,
    fetching: bool,

    pump_tx: Sender<(usize, u64)>,
    pump_running: bool,
    finish_alerted: bool,
}

impl TriageApp {
    fn new(
        config: Config,
        session: DashboardSession,
        launch: Launch,
        main_tx: Sender<usize>,
        pump_tx: Sender<(usize, u64)>,
        clear_between_frames: bool,
        now: i64,
    ) -> Result<Self> {
        let client = RowClient::new(&config.webapp_url, config.backend_token.clone())?;
        let (fetch_tx, fetch_rx) = mpsc::channel();
        let mut app = Self {
            config,
            client,
            session,
            row: launch.row,
            mode: launch.mode,
            locked: launch.locked,
            clear_between_frames,
            record: None,
            countdown: CountdownSource::Local {
                anchor: CountdownAnchor::new(0, now),
                parsed: ParsedDuration::default(),
            },
            notes: Vec::new(),
            main_tx,
            fetch_tx,
            fetch_rx,
            fetching: false,
            pump_tx,
            pump_running: false,
            finish_alerted: false,
        };

        if app.session.signer().is_fallback() {
            app.note(Note::WeakSecret);
        }

        if app.locked {
            // The token is the only timing source in a locked view
            app.countdown = app
                .session
                .handoff_countdown(launch.timer_token.as_deref(), now);
            if let CountdownSource::Handoff { row, .. } = app.countdown {
                if row != app.row {
                    app.note(Note::RowMismatch {
                        link_row: app.row,
                        token_row: row,
                    });
                    app.row = row;
                }
            }
            app.check_finished(now);
        }
        Ok(app)
    }

    fn note(&mut self, note: Note) {
        if !self.notes.contains(&note) {
            fire_alert(&self.config.alerts, &note);
            self.notes.push(note);
        }
    }

    fn clear_fetch_notes(&mut self) {
        self.notes
            .retain(|n| !matches!(n, Note::UnparsedTimer { .. } | Note::BackendUnavailable(_)));
    }

    /// Blocking fetch, used before the main loop starts.
    fn refresh(&mut self) -> Result<()> {
        self.clear_fetch_notes();
        loop {
            let fetched = self.client.get_row(self.row);
            if self.accept_fetch(fetched, now_secs())? {
                return Ok(());
            }
        }
    }

    /// Returns `Ok(false)` when the row was clamped and has to be fetched again.
    fn accept_fetch(&mut self, fetched: Fetched, now: i64) -> Result<bool> {
        let record = match fetched {
            Ok(record) => record,
            Err(e) if self.locked => {
                self.note(Note::BackendUnavailable(format!("{:#}", e)));
                self.record = None;
                return Ok(true);
            }
            Err(e) => return Err(e),
        };
        if self.clamp_row(record.max_rows) {
            self.record = None;
            return Ok(false);
        }
        self.apply_record(record, now);
        Ok(true)
    }

    fn clamp_row(&mut self, max_rows: u32) -> bool {
        let last = max_rows.max(1);
        if self.locked || self.row <= last {
            return false;
        }
        self.note(Note::RowOutOfRange {
            requested: self.row,
            max_rows: last,
        });
        self.row = last;
        true
    }

    fn apply_record(&mut self, record: RowRecord, now: i64) {
        if !self.locked {
            let before = self.countdown.anchor();
            self.countdown = self
                .session
                .local_countdown(self.row, record.timer.as_ref(), now);
            if let CountdownSource::Local { parsed, .. } = &self.countdown {
                if parsed.is_suspicious() {
                    let raw = parsed.raw.clone();
                    self.note(Note::UnparsedTimer { raw });
                }
            }
            if before != self.countdown.anchor() {
                self.notes
                    .retain(|n| !matches!(n, Note::CountdownFinished { .. }));
                self.finish_alerted = false;
            }
        }
        self.record = Some(record);
    }

    fn request_refresh(&mut self) {
        if self.fetching {
            return;
        }
        self.fetching = true;
        let client = self.client.clone();
        let row = self.row;
        let results = self.fetch_tx.clone();
        let main = self.main_tx.clone();
        thread::spawn(move || {
            let fetched = client.get_row(row);
            if results.send(fetched).is_ok() {
                main.send(AppOp::Fetched as usize).ok();
            }
        });
    }

    fn handle_refresh(&mut self) {
        self.clear_fetch_notes();
        self.request_refresh();
        self.redraw();
    }

    fn handle_fetched(&mut self, now: i64) {
        let Ok(fetched) = self.fetch_rx.try_recv() else {
            return;
        };
        self.fetching = false;
        match self.accept_fetch(fetched, now) {
            Ok(true) => {}
            Ok(false) => {
                self.request_refresh();
                return;
            }
            Err(e) => {
                log::error!("refresh failed: {:#}", e);
                self.note(Note::BackendUnavailable(format!("{:#}", e)));
            }
        }
        self.start_pump_if_counting(now);
        self.redraw();
    }

    fn submit_category(&mut self, category: TriageCategory) -> Result<()> {
        if self.locked {
            self.note(Note::EditingLocked);
            return Ok(());
        }
        self.client.update_field(self.row, category)?;
        self.mode = ViewMode::View;
        Ok(())
    }

    fn handoff_link(&self) -> Option<String> {
        if self.locked {
            return None;
        }
        let base = self.config.handoff_base_url.as_deref()?;
        let anchor = self.session.anchor_for(self.row)?;
        Some(self.session.handoff_link(base, self.row, anchor))
    }

    fn redraw(&self) {
        let link = self.handoff_link();
        let screen = ui::Screen {
            row: self.row,
            mode: self.mode,
            locked: self.locked,
            record: self.record.as_ref(),
            countdown: &self.countdown,
            link: link.as_deref(),
            notes: &self.notes,
        };
        let mut frame = String::new();
        if self.clear_between_frames {
            ui::clear_screen(&mut frame);
        }
        frame.push_str(&ui::draw_dashboard(&screen, now_secs()));
        ui::present(&frame);
    }

    fn start_pump(&mut self, interval_ms: u64) {
        if !self.pump_running {
            self.pump_running = true;
            self.pump_tx.send((PumpOp::Start as usize, interval_ms)).ok();
        }
    }

    fn stop_pump(&mut self) {
        if self.pump_running {
            self.pump_running = false;
            self.pump_tx.send((PumpOp::Stop as usize, 0)).ok();
        }
    }

    fn start_pump_if_counting(&mut self, now: i64) {
        let counting = self
            .countdown
            .anchor()
            .map(|a| !is_finished(a, now))
            .unwrap_or(false);
        if counting {
            self.start_pump(TICK_MS);
        }
    }

    /// True once nothing is left to count. Alerts once per anchor.
    fn check_finished(&mut self, now: i64) -> bool {
        let Some(anchor) = self.countdown.anchor() else {
            return true;
        };
        if !is_finished(anchor, now) {
            return false;
        }
        if !self.finish_alerted && anchor.origin > 0 {
            self.finish_alerted = true;
            self.note(Note::CountdownFinished { row: self.row });
        }
        true
    }

    // The backend is not consulted on a tick
    fn handle_pump(&mut self, now: i64) {
        if self.check_finished(now) {
            self.stop_pump();
        }
        self.redraw();
    }

    fn shutdown(&mut self) {
        self.stop_pump();
        self.pump_tx.send((PumpOp::Quit as usize, 0)).ok();
        self.session.end();
    }
}

fn pump_thread(control: Receiver<(usize, u64)>, main: Sender<usize>) {
    let mut interval_ms = TICK_MS;
    let mut running = false;

    loop {
        if running {
            thread::sleep(Duration::from_millis(interval_ms));
            if main.send(AppOp::Pump as usize).is_err() {
                break;
            }
        }

        // Non-blocking when running, block-wait when stopped
        let msg = if running {
            match control.try_recv() {
                Ok(msg) => Some(msg),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match control.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            }
        };

        if let Some((id, arg)) = msg {
            match FromPrimitive::from_usize(id) {
                Some(PumpOp::Start) => {
                    interval_ms = if arg == 0 { 100 } else { arg };
                    running = true;
                }
                Some(PumpOp::Stop) => running = false,
                Some(PumpOp::Quit) => break,
                None => log::error!("unknown pump opcode: {}", id),
            }
        }
    }
}

fn input_thread(main: Sender<usize>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let op = match line.trim() {
            "q" => AppOp::Quit,
            "r" => AppOp::Refresh,
            _ => AppOp::Redraw,
        };
        if main.send(op as usize).is_err() {
            break;
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    log::info!("{} PID is {}", APP_NAME, std::process::id());

    let config = Config::load()?;
    let signer = Signer::new(config.handoff_secret.as_deref());
    let session_id = cli
        .session
        .clone()
        .unwrap_or_else(|| format!("{}-{}", std::process::id(), now_secs()));
    let session = DashboardSession::new(session_id, signer);
    log::debug!("session {}", session.id());

    let (main_tx, main_rx) = mpsc::channel::<usize>();
    let (pump_tx, pump_rx) = mpsc::channel::<(usize, u64)>();

    let launch = Launch::from_cli(&cli);
    let mut app = TriageApp::new(
        config,
        session,
        launch,
        main_tx.clone(),
        pump_tx,
        !cli.once,
        now_secs(),
    )?;

    if let Some(category) = cli.set {
        app.submit_category(category)?;
    }
    app.refresh()?;
    app.redraw();

    if cli.once {
        app.shutdown();
        return Ok(());
    }

    let pump_main = main_tx.clone();
    thread::spawn(move || pump_thread(pump_rx, pump_main));
    thread::spawn(move || input_thread(main_tx));
    app.start_pump_if_counting(now_secs());

    while let Ok(id) = main_rx.recv() {
        match FromPrimitive::from_usize(id) {
            Some(AppOp::Redraw) => app.redraw(),
            Some(AppOp::Refresh) => app.handle_refresh(),
            Some(AppOp::Fetched) => app.handle_fetched(now_secs()),
            Some(AppOp::Pump) => app.handle_pump(now_secs()),
            Some(AppOp::Quit) => break,
            None => log::error!("unknown opcode: {}", id),
        }
    }

    app.shutdown();
    Ok(())
}
