mod config;
mod render;

use clap::Parser;
use monitor_engine::MonitorHandle;
use monitor_logging::{monitor_info, monitor_warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use config::Cli;
use render::Renderer;

const HELP: &str = "commands: r reconnect | c clear | h hide | v show | s <json> send | q quit";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    monitor_logging::initialize(cli.log.into(), cli.log_level(), &cli.log_file);

    let settings = config::load_settings(&cli)?;
    monitor_info!("Starting monitor for {}", settings.base_url);
    let handle = MonitorHandle::from_settings(&settings)?;

    println!("{HELP}");
    run(&handle).await?;
    handle.shutdown().await;
    Ok(())
}

async fn run(handle: &MonitorHandle) -> anyhow::Result<()> {
    let mut updates = handle.subscribe();
    let mut renderer = Renderer::default();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    print_lines(renderer.render(&handle.snapshot()));
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    monitor_warn!("Monitor client stopped unexpectedly");
                    return Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                print_lines(renderer.render(&snapshot));
            }
            line = input.next_line() => match line? {
                Some(line) => {
                    if !apply_command(handle, line.trim()) {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            },
        }
    }
}

/// Returns false when the operator asked to quit.
fn apply_command(handle: &MonitorHandle, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "q" | "quit" => return false,
        "r" | "reconnect" => handle.reconnect(),
        "c" | "clear" => handle.clear_messages(),
        "h" | "hide" => handle.set_visible(false),
        "v" | "show" => handle.set_visible(true),
        "s" | "send" => match serde_json::from_str::<serde_json::Value>(rest.trim()) {
            Ok(payload) => handle.send(&payload),
            Err(err) => println!("not valid JSON: {err}"),
        },
        _ => println!("{HELP}"),
    }
    true
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}
