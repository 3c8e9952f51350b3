//! # wlwindow-demo
//!
//! Opens one toplevel window, logs its lifecycle and pointer events and
//! exits when the compositor asks it to close.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info};
use wlwindow::{ErrorKind, MouseAction, WindowManager, WmConfig, WmEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DispatchMode {
    /// Block in the built-in loop
    Run,
    /// Non-blocking polling with a short sleep between ticks
    Poll,
    /// One blocking batch per tick
    Wait,
}

#[derive(Parser)]
#[command(name = "wlwindow-demo")]
#[command(about = "Open a Wayland toplevel window backed by shared-memory buffers")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/wlwindow/wlwindow.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Initial window width
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 400)]
    height: u32,

    /// Window title
    #[arg(long, default_value = "wlwindow")]
    title: String,

    /// Application id reported to the compositor
    #[arg(long)]
    app_id: Option<String>,

    /// How the event loop is driven
    #[arg(long, value_enum, default_value_t = DispatchMode::Run)]
    mode: DispatchMode,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging so general.debug can raise the filter
    let loaded = WmConfig::load(&cli.config);
    let debug = cli.debug || loaded.as_ref().map_or(false, |c| c.general.debug);
    let filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("🚀 Starting wlwindow-demo {}", wlwindow::VERSION);
    info!(
        "📄 Built {} for {}",
        env!("BUILD_DATE"),
        env!("TARGET_TRIPLE")
    );
    if let Some(commit) = option_env!("GIT_COMMIT") {
        info!("📄 Commit {}", commit);
    }

    let config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            info!("📝 Using default configuration ({:#})", e);
            WmConfig::default()
        }
    };
    config.validate().context("Invalid configuration")?;

    let on_error: wlwindow::ErrorCallback = Box::new(|kind: ErrorKind, message: &str| {
        error!("❌ {}: {}", kind, message);
    });
    let mut manager = WindowManager::connect(config, Some(on_error))
        .context("Could not set up the Wayland connection")?;

    let id = manager
        .create_window(cli.width, cli.height, &cli.title)
        .context("Failed to create window")?;

    let quit = manager.quit_handle();
    if let Some(mut window) = manager.window_mut(id) {
        if let Some(app_id) = &cli.app_id {
            window.set_app_id(app_id);
        }
        window.set_event_callback(move |event, window| {
            info!(
                "🪟 {:?} ({}x{}, focused: {})",
                event,
                window.width(),
                window.height(),
                window.has_focus()
            );
            if event == WmEvent::WindowCloseRequested {
                quit.request_quit();
            }
        });
        window.set_mouse_callback(|mouse, _| {
            if mouse.action != MouseAction::Move {
                info!(
                    "🖱️ {:?} {:?} at ({:.1}, {:.1}) delta ({:.1}, {:.1})",
                    mouse.action, mouse.button, mouse.x, mouse.y, mouse.delta_x, mouse.delta_y
                );
            }
        });
    }

    if manager.show_window(id)? {
        info!("✨ Window shown");
    }

    match cli.mode {
        DispatchMode::Run => manager.run()?,
        DispatchMode::Poll => {
            while !manager.quit_requested() {
                manager.poll_events()?;
                std::thread::sleep(std::time::Duration::from_millis(8));
            }
        }
        DispatchMode::Wait => {
            while !manager.quit_requested() {
                manager.wait_events()?;
            }
        }
    }

    manager.destroy_window(id);
    info!("👋 wlwindow-demo shutting down");
    Ok(())
}
