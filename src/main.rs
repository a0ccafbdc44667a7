//! AIPAWE — host entry point.
//!
//! Runs the suppression controller against the simulated hardware, with
//! the background timelines around it.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimHardware        LogEventSink   FileConfigSource            │
//! │  (Motion+Suppress+  (EventSink)    (ConfigSource)              │
//! │   Detection+Time)   LogMessenger   DetectionFeed               │
//! │                     (Messaging)    (console → DetectionPort)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        SuppressionController (pure FSM + effects)      │    │
//! │  │   TargetQueue · ConfigStore · EmergencyStop            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Threads: cfg-reload · watchdog · sms-out · console            │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `aipawe [config.json|config.bin]` (default `aipawe.json`).
//! Console commands: `fire <angle> <conf> [hits]`, `stop`, `resume`,
//! `reload`, `status`, `quit`.

#![deny(unused_must_use)]

use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{info, warn};

use aipawe::adapters::config_file::FileConfigSource;
use aipawe::adapters::detection_feed::DetectionFeed;
use aipawe::adapters::hardware::{Scene, SimFire, SimHardware};
use aipawe::adapters::log_sink::LogEventSink;
use aipawe::adapters::messaging::LogMessenger;
use aipawe::adapters::time::MonotonicClock;
use aipawe::app::commands::OperatorCommand;
use aipawe::app::ports::{ConfigError, ConfigSource, TimePort};
use aipawe::app::service::{ControllerLinks, SuppressionController};
use aipawe::config::SystemConfig;
use aipawe::config_store::{ConfigStore, decode};
use aipawe::estop::EmergencyStop;
use aipawe::fsm::context::Detection;
use aipawe::notify::{NotificationGateway, Outbox};
use aipawe::runtime::{Runtime, spawn_named};

const DEFAULT_CONFIG_PATH: &str = "aipawe.json";
const SMS_RECIPIENT: &str = "operator";

type CommandChannel = Channel<CriticalSectionRawMutex, OperatorCommand, 8>;

/// Initial config: the file if present, defaults if it does not exist.
/// A file that exists but is unreadable or invalid is a startup error.
fn load_initial(source: &FileConfigSource) -> Result<SystemConfig> {
    match source.fetch().and_then(|raw| decode(&raw)) {
        Ok(cfg) => {
            info!("Config loaded from {}", source.path().display());
            Ok(cfg)
        }
        Err(ConfigError::NotFound) => {
            warn!(
                "No config at {}, using defaults",
                source.path().display()
            );
            Ok(SystemConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("loading {}", source.path().display())),
    }
}

/// Read console lines and forward parsed commands to the control loop.
/// `stop` latches here so it reaches an actuation already in progress.
fn console(commands: Arc<CommandChannel>, estop: Arc<EmergencyStop>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match OperatorCommand::parse(&line) {
            Ok(OperatorCommand::Stop) => estop.engage(),
            Ok(cmd) => {
                let quit = cmd == OperatorCommand::Quit;
                futures_lite::future::block_on(commands.send(cmd));
                if quit {
                    return;
                }
            }
            Err(e) => warn!("Console: {}", e),
        }
    }
    // EOF behaves like quit.
    futures_lite::future::block_on(commands.send(OperatorCommand::Quit));
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  AIPAWE v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Configuration ──────────────────────────────────────
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let source = FileConfigSource::new(&path);
    let config = load_initial(&source)?;
    let store = Arc::new(ConfigStore::new(config).context("initial config rejected")?);

    // ── 3. Shared state + adapters ────────────────────────────
    let links = ControllerLinks::new(Arc::clone(&store));
    let outbox = Arc::new(Outbox::new());
    let clock = MonotonicClock::new();
    let feed = DetectionFeed::new();
    let scene: Scene = Arc::new(Mutex::new(Vec::new()));
    let scan = store.current().config.scan.clone();
    let mut hw = SimHardware::new(
        clock.clone(),
        feed.clone(),
        Arc::clone(&scene),
        Arc::clone(&links.estop),
        scan.rpm,
        scan.sector_size_deg,
    );
    let mut sink = LogEventSink::new();

    // ── 4. Background timelines ───────────────────────────────
    let mut runtime = Runtime::new(Arc::clone(&outbox));
    runtime.spawn_reloader(Arc::clone(&store), FileConfigSource::new(&path))?;
    runtime.spawn_watchdog(
        clock.clone(),
        Arc::clone(&links.clock),
        Arc::clone(&links.stuck),
        Arc::clone(&store),
    )?;
    runtime.spawn_notifier(LogMessenger::new(SMS_RECIPIENT), Arc::clone(&store))?;

    let commands: Arc<CommandChannel> = Arc::new(Channel::new());
    {
        let commands = Arc::clone(&commands);
        let estop = Arc::clone(&links.estop);
        // Detached: blocks on stdin until EOF.
        let _console = spawn_named("console", move || console(commands, estop))?;
    }

    // ── 5. Controller ─────────────────────────────────────────
    let mut controller = SuppressionController::new(links, NotificationGateway::new(outbox));
    controller.start(&mut hw, &mut sink);
    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    'control: loop {
        while let Ok(cmd) = commands.try_receive() {
            match cmd {
                OperatorCommand::Stop => controller.links().estop.engage(),
                OperatorCommand::Resume => controller.links().estop.release(),
                OperatorCommand::Fire {
                    sector_deg,
                    confidence,
                    hits,
                } => {
                    if let Ok(mut fires) = scene.lock() {
                        fires.push(SimFire {
                            sector_deg,
                            elevation_deg: 0.0,
                            confidence,
                            hits_remaining: hits,
                        });
                    }
                    feed.push(Detection::new(sector_deg, confidence, clock.now_ms()));
                }
                OperatorCommand::Reload => {
                    // Failure is logged by the store.
                    let _ = store.reload(&source);
                }
                OperatorCommand::Status => {
                    let s = controller.status();
                    info!(
                        "STATUS | state={} | halted={} | pending={} | episode={:?} | sector={:?} | attempts={} | config=v{} | ticks={}",
                        s.state,
                        s.halted,
                        s.pending_targets,
                        s.episode,
                        s.active_sector_deg,
                        s.attempts_this_episode,
                        s.config_version,
                        s.tick_count
                    );
                }
                OperatorCommand::Quit => break 'control,
            }
        }

        controller.tick(&mut hw, &mut sink);

        let interval = store.current().config.state_machine.loop_interval_ms;
        std::thread::sleep(Duration::from_millis(u64::from(interval)));
    }

    // ── 7. Shutdown ───────────────────────────────────────────
    info!("Shutting down");
    controller.links().estop.engage();
    controller.tick(&mut hw, &mut sink);
    runtime.stop();
    Ok(())
}
