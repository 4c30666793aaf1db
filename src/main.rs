use anyhow::Result;
use asus_helper::cli::{Cli, Command};
use asus_helper::debounce::Debouncer;
use asus_helper::profile::ProfileStore;
use asus_helper::reconciler::Reconciler;
use asus_helper::runner::{ProcessRunner, ToolRunner};
use asus_helper::settings::{RawValue, Setting, SettingsRequest};
use asus_helper::single_instance::{self, Acquisition};
use asus_helper::{output, settings};
use clap::Parser;
use colored::Colorize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on one event-loop turn while idle, so activate requests
/// are noticed promptly even with no pending debounce deadline.
const IDLE_TICK: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.debug { "debug" } else { "warn" }),
    )
    .init();

    match cli.command {
        Command::Status => cmd_status(cli.json),
        Command::Apply { profile } => cmd_apply(profile, cli.config),
        Command::Profiles => cmd_profiles(cli.config),
        Command::Set { key, value } => cmd_set(&key, &value),
        Command::Run => cmd_run(cli.config),
        Command::Completions { shell } => {
            asus_helper::cli::print_completions(shell);
            Ok(())
        }
    }
}

fn load_store(config: Option<PathBuf>) -> Result<ProfileStore> {
    let path = config.unwrap_or_else(ProfileStore::default_path);
    Ok(ProfileStore::load(path)?)
}

fn new_reconciler() -> Reconciler {
    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());
    Reconciler::new(runner)
}

fn cmd_status(json: bool) -> Result<()> {
    let reconciler = new_reconciler();
    let states = reconciler.collect_states();

    if json {
        output::print_status_json(&states);
    } else {
        output::print_status(&states);
    }
    Ok(())
}

fn cmd_apply(profile: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let mut store = load_store(config)?;
    let name = profile.unwrap_or_else(|| store.current_profile_name().to_string());

    let Some(request) = store.request_for(&name) else {
        anyhow::bail!(
            "no such profile: {} (available: {})",
            name,
            store.profile_names().join(", ")
        );
    };

    println!("Applying profile {}...", name.bold());
    let reconciler = new_reconciler();
    let report = reconciler.apply_profile(&request);
    output::print_apply_report(&report);

    if store.current_profile_name() != name {
        store.set_current_profile(&name)?;
    }
    Ok(())
}

fn cmd_profiles(config: Option<PathBuf>) -> Result<()> {
    let store = load_store(config)?;
    for name in store.profile_names() {
        if name == store.current_profile_name() {
            println!("{} {}", "*".green(), name.bold());
        } else {
            println!("  {}", name);
        }
    }
    Ok(())
}

fn cmd_set(key: &str, value: &str) -> Result<()> {
    let Some(setting) = Setting::from_raw(key, &RawValue::parse(value)) else {
        // Unrecognized keys are a no-op by design, matching the profile
        // boundary: newer config fields must not break older binaries.
        println!("{} unrecognized setting '{}', nothing applied", "Note:".yellow(), key);
        return Ok(());
    };

    let request: SettingsRequest = [setting].into_iter().collect();
    let reconciler = new_reconciler();
    let report = reconciler.apply_profile(&request);
    output::print_apply_report(&report);
    Ok(())
}

fn cmd_run(config: Option<PathBuf>) -> Result<()> {
    let lock_path = Path::new(single_instance::DEFAULT_LOCK_PATH);

    let lock = match single_instance::acquire(lock_path)? {
        Acquisition::Acquired(lock) => lock,
        Acquisition::AlreadyRunning => {
            println!("Another instance is already running.");
            match single_instance::signal_holder(lock_path) {
                Ok(pid) => println!("Asked the existing instance (pid {}) to surface itself.", pid),
                Err(e) => log::warn!("{}", e),
            }
            return Ok(());
        }
    };

    single_instance::install_activate_handler()?;

    let mut store = load_store(config)?;
    let reconciler = new_reconciler();
    let mut debouncer = Debouncer::new();

    // Blocking reads happen on their own thread; the loop below only
    // ever waits on the channel with a bounded timeout.
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    println!(
        "Resident instance (pid {}). Commands: set <key> <value> | apply [profile] | status | quit",
        std::process::id()
    );

    loop {
        let now = Instant::now();
        let wait = debouncer
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(IDLE_TICK)
            .min(IDLE_TICK);

        let mut stop = false;
        match rx.recv_timeout(wait) {
            Ok(line) => {
                stop = !handle_line(line.trim(), &mut debouncer, &reconciler, &mut store);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => stop = true,
        }

        if let Some(request) = debouncer.take_ready(Instant::now()) {
            reconciler.apply_profile(&request);
        }

        // The signal handler only sets a flag; surfacing happens here,
        // on an ordinary loop turn.
        if single_instance::take_activate_request() {
            if stop {
                log::debug!("activate request ignored during shutdown");
            } else {
                println!("{}", "Activate requested by another launch.".bold());
            }
        }

        if stop {
            break;
        }
    }

    // Pending changes still land before we give the lock up.
    if let Some(request) = debouncer.drain() {
        reconciler.apply_profile(&request);
    }
    lock.release();
    Ok(())
}

/// One line of the resident command protocol. Returns false to stop.
fn handle_line(
    line: &str,
    debouncer: &mut Debouncer,
    reconciler: &Reconciler,
    store: &mut ProfileStore,
) -> bool {
    let mut words = line.split_whitespace();
    match words.next() {
        None => true,
        Some("quit") | Some("exit") => false,
        Some("status") => {
            output::print_status(&reconciler.collect_states());
            true
        }
        Some("set") => {
            let (Some(key), Some(value)) = (words.next(), words.next()) else {
                println!("usage: set <key> <value>");
                return true;
            };
            match settings::Setting::from_raw(key, &RawValue::parse(value)) {
                Some(setting) => debouncer.submit(setting, Instant::now()),
                None => println!("ignoring unrecognized setting '{}'", key),
            }
            true
        }
        Some("apply") => {
            let name = words
                .next()
                .map(String::from)
                .unwrap_or_else(|| store.current_profile_name().to_string());
            match store.request_for(&name) {
                Some(request) => {
                    let report = reconciler.apply_profile(&request);
                    output::print_apply_report(&report);
                    if store.current_profile_name() != name {
                        if let Err(e) = store.set_current_profile(&name) {
                            log::warn!("{}", e);
                        }
                    }
                }
                None => println!("no such profile: {}", name),
            }
            true
        }
        Some(other) => {
            println!("unknown command: {}", other);
            true
        }
    }
}
