use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use alarm_core::{
    Alarm, AlarmId, AlarmService, AlarmStore, AlarmTable, AlarmTime, DaySet, MessageBus, PermissionState,
    SnackbarMessage,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ConfigOverrides};
use crate::desktop::{DesktopPlatform, LoggingLauncher};
use crate::timer::TimerScheduler;

const RESCAN_EVERY: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "alarmclock", version, about = "Alarm clock")]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Show active alarms.
    List,
    /// Set an alarm, e.g. `add 07:30 --days mon,tue`.
    Add {
        time: String,
        #[arg(long, default_value = "")]
        days: String,
    },
    /// Change an alarm's time and days.
    Edit {
        id: AlarmId,
        time: String,
        #[arg(long, default_value = "")]
        days: String,
    },
    Toggle { id: AlarmId },
    /// Move an alarm to the trash.
    Delete { id: AlarmId },
    /// Bring back a deleted alarm.
    Undo { id: AlarmId },
    /// Empty the trash.
    Purge,
    Snooze { id: AlarmId },
    Dismiss { id: AlarmId },
    /// Show platform capabilities the alarms depend on.
    Permissions,
    /// Re-arm alarms and wait for them to ring.
    Run,
}

pub struct App {
    service: AlarmService,
    table: Arc<AlarmTable>,
    permissions: PermissionState,
    inbox: broadcast::Receiver<SnackbarMessage>,
    fired: mpsc::UnboundedReceiver<AlarmId>,
}

impl App {
    /// Opens the alarm table and starts the orchestrator. Needs a running tokio runtime.
    pub fn start(config: &AppConfig) -> Result<Self> {
        let table = Arc::new(
            AlarmTable::open(&config.store_path)
                .with_context(|| format!("failed to open alarm table {}", config.store_path.display()))?,
        );
        let (scheduler, fired) = TimerScheduler::new();
        let launcher = Arc::new(LoggingLauncher);
        let messages = MessageBus::new();
        let inbox = messages.subscribe();

        let service = AlarmService::builder()
            .with_store(table.clone())
            .with_scheduler(Arc::new(scheduler))
            .with_messages(messages)
            .with_settings_launcher(launcher.clone())
            .snooze_for(chrono::Duration::minutes(config.snooze_minutes))
            .spawn();
        let permissions = PermissionState::new(Arc::new(DesktopPlatform::from_config(config)), launcher);

        info!(store = %config.store_path.display(), "alarm clock started");
        Ok(Self {
            service,
            table,
            permissions,
            inbox,
            fired,
        })
    }

    /// Runs one command, writing human-readable output to `out`.
    pub async fn execute(&mut self, command: Command, out: &mut impl Write) -> Result<()> {
        self.reload().await?;
        match command {
            Command::List => {
                self.service.flush().await;
                let alarms = self.service.alarms().borrow().clone();
                if alarms.is_empty() {
                    writeln!(out, "no alarms")?;
                }
                for alarm in alarms {
                    writeln!(out, "{alarm}")?;
                }
            }
            Command::Add { time, days } => {
                let (time, days) = parse_schedule(&time, &days)?;
                self.service.create_alarm(time, days);
            }
            Command::Edit { id, time, days } => {
                let alarm = self.stored(id)?;
                let (time, days) = parse_schedule(&time, &days)?;
                self.service.update_alarm(&alarm, time, days);
            }
            Command::Toggle { id } => {
                let alarm = self.stored(id)?;
                self.service.toggle_alarm(&alarm);
            }
            Command::Delete { id } => {
                let alarm = self.stored(id)?;
                self.service.soft_delete_alarm(&alarm);
            }
            Command::Undo { id } => {
                let alarm = self.stored(id)?;
                if !alarm.deleted {
                    bail!("alarm {id} is not deleted");
                }
                self.service.undo_soft_delete_alarm(alarm);
            }
            Command::Purge => self.service.delete_all_deleted_alarms(),
            Command::Snooze { id } => self.service.ring(id).snooze(),
            Command::Dismiss { id } => self.service.ring(id).cancel(),
            Command::Permissions => {
                self.permissions.refresh();
                for requirement in self.permissions.requirements() {
                    let mark = if requirement.granted { "ok" } else { "missing" };
                    writeln!(out, "{:<8} {:<18} {}", mark, requirement.id, requirement.description)?;
                }
                let summary = if self.permissions.is_all_critical_granted() {
                    "all critical permissions granted"
                } else {
                    "some critical permissions are missing"
                };
                writeln!(out, "{summary}")?;
            }
            Command::Run => return self.run(out).await,
        }
        self.service.flush().await;
        self.print_messages(out)
    }

    /// Restores triggers, then asks on stdin what to do each time an alarm rings. Changes other
    /// processes make to the alarm file are picked up and re-armed while waiting.
    async fn run(&mut self, out: &mut impl Write) -> Result<()> {
        self.service.restore_triggers();
        self.service.flush().await;
        self.print_messages(out)?;
        writeln!(out, "waiting for alarms")?;
        out.flush()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut rescan = tokio::time::interval(RESCAN_EVERY);
        rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let event = tokio::select! {
                fired = self.fired.recv() => match fired {
                    Some(alarm_id) => Wake::Ring(alarm_id),
                    None => break,
                },
                _ = rescan.tick() => Wake::Rescan,
            };

            match event {
                Wake::Rescan => self.rescan().await,
                Wake::Ring(alarm_id) => {
                    self.rescan().await;
                    let session = self.service.ring(alarm_id);
                    let Some(alarm) = session.alarm().await else {
                        continue;
                    };
                    if !alarm.enabled || alarm.deleted {
                        debug!(alarm_id, "stale timer fired, ignoring");
                        continue;
                    }
                    write!(out, "\x07{alarm} ringing, [s]nooze or Enter to dismiss: ")?;
                    out.flush()?;
                    let answer = lines.next_line().await.context("failed to read answer")?;
                    match answer.as_deref().map(str::trim) {
                        Some("s") | Some("S") => session.snooze(),
                        _ => session.cancel(),
                    }
                    self.service.flush().await;
                    self.print_messages(out)?;
                }
            }
        }
        Ok(())
    }

    /// Re-arms everything when the alarm file was changed by another process.
    async fn rescan(&self) {
        match self.reload().await {
            Ok(true) => {
                info!("alarm file changed, re-arming");
                self.service.restore_triggers();
                self.service.flush().await;
            }
            Ok(false) => {}
            Err(err) => warn!(error = %err, "alarm file rescan failed"),
        }
    }

    async fn reload(&self) -> Result<bool> {
        let table = Arc::clone(&self.table);
        tokio::task::spawn_blocking(move || table.reload())
            .await
            .context("alarm table reload aborted")?
            .context("failed to reload alarm table")
    }

    fn stored(&self, id: AlarmId) -> Result<Alarm> {
        self.table
            .get(id)
            .context("failed to read alarm table")?
            .ok_or_else(|| anyhow!("no alarm with id {id}"))
    }

    fn print_messages(&mut self, out: &mut impl Write) -> Result<()> {
        loop {
            match self.inbox.try_recv() {
                Ok(message) => match message.action_label {
                    Some(label) => writeln!(out, "{} [{label}]", message.text)?,
                    None => writeln!(out, "{}", message.text)?,
                },
                Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "older messages dropped"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(()),
            }
        }
    }
}

enum Wake {
    Ring(AlarmId),
    Rescan,
}

fn parse_schedule(time: &str, days: &str) -> Result<(AlarmTime, DaySet)> {
    let time = AlarmTime::parse(time)?;
    let days = DaySet::parse(days)?;
    Ok((time, days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            store_path: dir.join("alarms.json"),
            ..AppConfig::default()
        }
    }

    async fn exec(app: &mut App, command: Command) -> String {
        let mut out = Vec::new();
        app.execute(command, &mut out).await.expect("command succeeds");
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn add_list_delete_and_undo() {
        let temp = tempdir().unwrap();
        let mut app = App::start(&config(temp.path())).unwrap();

        let added = exec(
            &mut app,
            Command::Add {
                time: "07:30".into(),
                days: "mon,fri".into(),
            },
        )
        .await;
        assert_eq!(added.trim(), "Alarm set for 07:30");

        let listed = exec(&mut app, Command::List).await;
        assert!(listed.contains("07:30"), "{listed}");

        let deleted = exec(&mut app, Command::Delete { id: 1 }).await;
        assert_eq!(deleted.trim(), "Alarm deleted [Undo]");
        assert_eq!(exec(&mut app, Command::List).await.trim(), "no alarms");

        exec(&mut app, Command::Undo { id: 1 }).await;
        assert!(exec(&mut app, Command::List).await.contains("07:30"));
    }

    #[tokio::test]
    async fn unknown_ids_and_bad_times_are_reported() {
        let temp = tempdir().unwrap();
        let mut app = App::start(&config(temp.path())).unwrap();
        let mut out = Vec::new();

        assert!(app.execute(Command::Toggle { id: 9 }, &mut out).await.is_err());
        let bad = Command::Add {
            time: "25:00".into(),
            days: String::new(),
        };
        assert!(app.execute(bad, &mut out).await.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn permissions_listing_reflects_platform() {
        let temp = tempdir().unwrap();
        let mut cfg = config(temp.path());
        cfg.manufacturer = "xiaomi".into();
        let mut app = App::start(&cfg).unwrap();

        let listed = exec(&mut app, Command::Permissions).await;
        assert!(listed.contains("missing  miui_lock_screen"), "{listed}");
        assert!(listed.contains("ok       exact_alarm"), "{listed}");
        assert!(listed.ends_with("some critical permissions are missing\n"));
    }

    #[tokio::test]
    async fn commands_see_alarms_written_by_another_process() {
        let temp = tempdir().unwrap();
        let mut runner = App::start(&config(temp.path())).unwrap();
        let mut other = App::start(&config(temp.path())).unwrap();

        exec(&mut runner, Command::Add { time: "07:00".into(), days: String::new() }).await;
        exec(&mut other, Command::Add { time: "08:00".into(), days: String::new() }).await;

        let listed = exec(&mut runner, Command::List).await;
        assert!(listed.contains("#1 07:00") && listed.contains("#2 08:00"), "{listed}");

        exec(&mut runner, Command::Toggle { id: 1 }).await;
        let seen_elsewhere = exec(&mut other, Command::List).await;
        assert!(seen_elsewhere.contains("#1 07:00 [once] off"), "{seen_elsewhere}");
        assert!(seen_elsewhere.contains("#2 08:00 [once] on"), "{seen_elsewhere}");
    }

    #[tokio::test]
    async fn overflowing_message_backlog_still_prints_the_rest() {
        let temp = tempdir().unwrap();
        let mut app = App::start(&config(temp.path())).unwrap();
        for n in 0..40 {
            app.service.messages().publish(format!("notice {n}"));
        }

        let mut out = Vec::new();
        app.print_messages(&mut out).unwrap();
        let printed = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 32);
        assert_eq!(lines.first(), Some(&"notice 8"));
        assert_eq!(lines.last(), Some(&"notice 39"));
    }
}
