//! systemhook -- logs global keyboard and mouse events.
//!
//! Usage: `systemhook [--list-devices] [CONFIG]`
//!
//! Registers the hooks enabled in CONFIG (both, legacy mode, by default) on
//! their own threads and logs every event until Enter is pressed.

use std::io;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use systemhook::config::Config;
use systemhook::{
    ErrorCode, EventHandler, HookRegistry, HostRuntime, InputBackend, InputClass, KeyEvent,
    LocalRuntime, MouseEvent,
};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    let mut list_devices = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--list-devices" => list_devices = true,
            _ if config_path.is_none() => config_path = Some(arg),
            _ => {
                eprintln!("usage: systemhook [--list-devices] [CONFIG]");
                return ExitCode::FAILURE;
            }
        }
    }

    let config = match config_path {
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("systemhook: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
    log::info!("systemhook v{}", env!("CARGO_PKG_VERSION"));

    run(list_devices, &config)
}

#[cfg(target_os = "windows")]
fn run(list_devices: bool, config: &Config) -> ExitCode {
    let registry = Arc::new(HookRegistry::new(systemhook::WindowsBackend::new()));
    if list_devices {
        print_devices(&registry)
    } else {
        capture(registry, config)
    }
}

#[cfg(not(target_os = "windows"))]
fn run(_list_devices: bool, _config: &Config) -> ExitCode {
    log::error!("main: system hooks are only available on Windows");
    ExitCode::FAILURE
}

/// Logs every delivered event.
struct LogHandler;

impl EventHandler for LogHandler {
    fn supports(&self, _class: InputClass) -> bool {
        true
    }

    fn on_key_event(&self, event: &KeyEvent) {
        log::info!("{}", describe_key(event));
    }

    fn on_mouse_event(&self, event: &MouseEvent) {
        let (state, button, x, y, wheel, device) = event.upcall_args();
        log::info!(
            "mouse: {:?} state={state} button={button:#x} x={x} y={y} wheel={wheel} device={device:#x}",
            event.transition,
        );
    }
}

fn describe_key(event: &KeyEvent) -> String {
    let (vk, pressed, character, device) = event.upcall_args();
    format!(
        "key: vk={vk:#04x} scan={:#04x} pressed={pressed} char={character:#06x} {:?} device={device:#x}",
        event.scan_code,
        event.as_char(),
    )
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn print_devices<B: InputBackend>(registry: &HookRegistry<B>) -> ExitCode {
    for class in InputClass::ALL {
        let devices = match registry.list_devices(class) {
            Ok(devices) => devices,
            Err(e) => {
                log::error!("devices: {class} enumeration failed: {e}");
                return ExitCode::FAILURE;
            }
        };
        println!("{class} devices ({}):", devices.len());
        for (handle, name) in &devices {
            println!("  {:#x}  {}", handle.as_i64(), name.as_deref().unwrap_or("<unnamed>"));
        }
    }
    ExitCode::SUCCESS
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn capture<B: InputBackend + 'static>(registry: Arc<HookRegistry<B>>, config: &Config) -> ExitCode {
    let runtime = Arc::new(LocalRuntime::new());
    let handler: Arc<dyn EventHandler> = Arc::new(LogHandler);

    let mut workers = Vec::new();
    for class in InputClass::ALL {
        let settings = config.class(class);
        if !settings.enabled {
            continue;
        }

        let mode = settings.mode();
        let registry = Arc::clone(&registry);
        let host: Arc<dyn HostRuntime> = runtime.clone();
        let handler = Arc::clone(&handler);
        let spawned = thread::Builder::new()
            .name(format!("{class}-hook"))
            .spawn(move || registry.register_hook(class, mode, host, handler));
        match spawned {
            Ok(worker) => workers.push((class, worker)),
            Err(e) => log::error!("main: could not spawn {class} hook thread: {e}"),
        }
    }

    if workers.is_empty() {
        log::error!("main: no hook enabled");
        return ExitCode::FAILURE;
    }

    for (class, _) in &workers {
        if runtime.wait_ready_timeout(*class, READY_TIMEOUT) {
            log::info!("main: {class} hook ready");
        } else {
            log::warn!("main: {class} hook not ready after {READY_TIMEOUT:?}");
        }
    }

    println!("Press Enter to stop.");
    let mut line = String::new();
    if let Err(e) = io::stdin().read_line(&mut line) {
        log::warn!("main: stdin read failed ({e}), stopping");
    }

    for class in InputClass::ALL {
        registry.unregister_hook(class);
    }

    let mut clean = true;
    for (class, worker) in workers {
        match worker.join() {
            Ok(code) => {
                log::info!("main: {class} hook returned {code:?} ({})", code.as_i32());
                clean &= code == ErrorCode::Success;
            }
            Err(_) => {
                log::error!("main: {class} hook thread panicked");
                clean = false;
            }
        }
    }

    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
