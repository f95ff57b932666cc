use std::{io::BufRead, sync::Arc};

use anyhow::Context;
use thymelab_launcher::{
    command::CommandBuilder,
    console::{Console, ConsoleCommand, EventSink, UiEvent},
    logging,
    settings::{self, Settings},
    supervisor::{ProcessSupervisor, SupervisorOptions},
    transcript::{self, Transcript},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const HELP: &str =
    "commands: start | stop | restart | status | level <INFO|DEBUG|WARN|ERROR> | buffer <n> | clear | info | quit";

// Blocking stdin on its own thread; a tokio stdin read would hold the
// runtime open at exit.
fn read_commands(sink: EventSink) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(cmd) => sink.post(UiEvent::Command(cmd)),
            Err(err) => sink.post(UiEvent::Notice(err.to_string())),
        }
    }
    sink.post(UiEvent::Command(ConsoleCommand::Quit));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = settings::settings_path();
    let settings = Settings::load(&settings_path)?;
    let (level, _log_guard) = logging::init(&settings.log_level(), Some(&settings::log_dir()))?;
    tracing::info!(
        settings = %settings_path.display(),
        version = env!("CARGO_PKG_VERSION"),
        "thymelab-launcher starting"
    );

    let autostart = settings.get_bool(settings::KEY_AUTOSTART, false);
    let transcript_path = settings.console_log_file();
    let (settings, _) = watch::channel(settings);

    let planner = Arc::new(CommandBuilder::new(settings.subscribe()));
    let (sink, events) = EventSink::channel();
    let supervisor = ProcessSupervisor::new(
        planner,
        Arc::new(sink.clone()),
        Arc::new(sink.clone()),
        SupervisorOptions::default(),
    );

    let mut console = Console::new(
        supervisor.clone(),
        sink.clone(),
        events,
        settings,
        tokio::io::stdout(),
    )
    .with_settings_path(settings_path)
    .with_level_handle(level);
    if let Some(path) = transcript_path {
        let (transcript, writer) = Transcript::open(
            &path,
            transcript::DEFAULT_MAX_BYTES,
            transcript::DEFAULT_MAX_FILES,
        );
        supervisor.spawn_task(writer);
        console = console.with_transcript(transcript);
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                shutdown.cancel();
            }
        }
    });

    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn({
            let sink = sink.clone();
            move || read_commands(sink)
        })
        .context("spawn stdin reader")?;

    sink.post(UiEvent::Notice(HELP.to_string()));
    if autostart {
        sink.post(UiEvent::Command(ConsoleCommand::Start));
    }
    drop(sink);

    console.run(shutdown).await;
    supervisor.shutdown().await;
    tracing::info!("thymelab-launcher stopped");
    Ok(())
}
