//! Photo cycling scheduler.
//!
//! A single tokio task owns the cycle timer. The rest of the service talks to
//! it through a [`SchedulerHandle`]: commands go in over a channel, status
//! comes out over a `watch` channel.
//!
//! ```text
//!   Idle --enable--> Waiting --interval elapsed--> Presenting --> Waiting
//!    ^                  |                              ^
//!    +-----disable------+------display_now(name)-------+
//! ```
//!
//! Presenting (render + panel refresh, ~25 s on hardware) runs on a blocking
//! thread awaited by the scheduler task. Commands that arrive meanwhile are
//! handled once it finishes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigStore};
use crate::display::Display;
use crate::photos::PhotoStore;
use crate::render::prepare_frame;
use crate::Error;

/// What the scheduler is doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Cycling is off
    #[default]
    Idle,
    /// Waiting for the next cycle
    Waiting,
    /// Rendering and refreshing the panel
    Presenting,
}

/// Scheduler status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Current state of the cycle loop
    pub state: SchedulerState,
    /// Whether automatic cycling is on
    pub enabled: bool,
    /// When the next automatic change is due
    pub next_fire: Option<DateTime<Utc>>,
    /// Photo most recently sent to the display
    pub last_presented: Option<String>,
    /// When `last_presented` reached the display
    pub last_presented_at: Option<DateTime<Utc>>,
    /// Most recent cycle failure, cleared by the next success
    pub last_error: Option<String>,
    /// Successful presents since startup
    pub presented: u64,
}

#[derive(Debug)]
enum Command {
    Enable,
    Disable,
    DisplayNow(String),
}

/// Cloneable handle to the scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SchedulerStatus>,
}

impl SchedulerHandle {
    /// Start cycling with a full interval.
    pub fn enable(&self) -> Result<(), Error> {
        self.send(Command::Enable)
    }

    /// Stop cycling; a pending wait is cancelled.
    pub fn disable(&self) -> Result<(), Error> {
        self.send(Command::Disable)
    }

    /// Show `name` now and restart the interval.
    ///
    /// Returns as soon as the command is queued.
    pub fn display_now(&self, name: impl Into<String>) -> Result<(), Error> {
        self.send(Command::DisplayNow(name.into()))
    }

    /// Current status.
    pub fn status(&self) -> SchedulerStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    fn send(&self, command: Command) -> Result<(), Error> {
        self.commands
            .send(command)
            .map_err(|_| Error::Internal("scheduler is not running".to_string()))
    }
}

/// Which photo a cycle shows.
enum Target {
    Next,
    Named(String),
}

struct Scheduler {
    config: Arc<ConfigStore>,
    photos: Arc<PhotoStore>,
    display: Arc<dyn Display>,
    status: watch::Sender<SchedulerStatus>,
    enabled: bool,
    deadline: Option<Instant>,
}

/// Spawn the scheduler task.
///
/// Cycling starts immediately if the stored config has it enabled. The task
/// ends when `cancel` fires or every handle is dropped.
pub fn spawn(
    config: Arc<ConfigStore>,
    photos: Arc<PhotoStore>,
    display: Arc<dyn Display>,
    cancel: CancellationToken,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SchedulerStatus::default());

    let enabled = config.snapshot().cycle_enabled;
    let mut scheduler = Scheduler {
        config,
        photos,
        display,
        status: status_tx,
        enabled: false,
        deadline: None,
    };
    if enabled {
        scheduler.enable();
    }

    let task = tokio::spawn(scheduler.run(commands_rx, cancel));
    let handle = SchedulerHandle {
        commands: commands_tx,
        status: status_rx,
    };
    (handle, task)
}

impl Scheduler {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        tracing::info!(display = self.display.name(), "Scheduler started");
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(Command::Enable) => self.enable(),
                    Some(Command::Disable) => self.disable(),
                    Some(Command::DisplayNow(name)) => self.present(Target::Named(name)).await,
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.present(Target::Next).await;
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }

    fn enable(&mut self) {
        self.enabled = true;
        self.start_wait();
        tracing::info!("Photo cycling enabled");
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.deadline = None;
        self.status.send_modify(|s| {
            s.state = SchedulerState::Idle;
            s.enabled = false;
            s.next_fire = None;
        });
        tracing::info!("Photo cycling disabled");
    }

    /// Start a full interval, read from the config now.
    fn start_wait(&mut self) {
        let interval = self.config.snapshot().cycle_interval;
        self.deadline = Some(Instant::now() + Duration::from_secs(interval));
        let next_fire = Utc::now() + chrono::Duration::seconds(interval as i64);
        self.status.send_modify(|s| {
            s.state = SchedulerState::Waiting;
            s.enabled = true;
            s.next_fire = Some(next_fire);
        });
        tracing::debug!("Next photo change in {}s", interval);
    }

    async fn present(&mut self, target: Target) {
        self.deadline = None;
        self.status.send_modify(|s| {
            s.state = SchedulerState::Presenting;
            s.next_fire = None;
        });

        let config = Arc::clone(&self.config);
        let photos = Arc::clone(&self.photos);
        let display = Arc::clone(&self.display);
        let result = tokio::task::spawn_blocking(move || {
            present_blocking(&config, &photos, display.as_ref(), target)
        })
        .await
        .map_err(Error::from)
        .and_then(|r| r);

        match result {
            Ok(Some(name)) => {
                self.status.send_modify(|s| {
                    s.last_presented = Some(name);
                    s.last_presented_at = Some(Utc::now());
                    s.last_error = None;
                    s.presented += 1;
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Photo cycle failed: {}", e);
                self.status.send_modify(|s| s.last_error = Some(e.to_string()));
            }
        }

        if self.enabled {
            self.start_wait();
        } else {
            self.status.send_modify(|s| s.state = SchedulerState::Idle);
        }
    }
}

/// Pick, record, render and show one photo. `Ok(None)` when there is nothing
/// to show.
fn present_blocking(
    config: &ConfigStore,
    photos: &PhotoStore,
    display: &dyn Display,
    target: Target,
) -> Result<Option<String>, Error> {
    let name = match target {
        Target::Named(name) => name,
        Target::Next => {
            let snapshot = config.snapshot();
            let list = photos.list(&snapshot.photo_order)?;
            let names: Vec<&str> = list.iter().map(|p| p.name.as_str()).collect();
            match next_photo(&names, snapshot.active_photo.as_deref()) {
                Some(name) => name.to_string(),
                None => {
                    tracing::info!("No photos to cycle");
                    return Ok(None);
                }
            }
        }
    };

    let snapshot = activate(config, photos, &name)?;

    tracing::info!(photo = %name, "Presenting photo");
    let frame = prepare_frame(
        &photos.path(&name)?,
        snapshot.orientation,
        &snapshot.widgets,
        snapshot.now(),
    )?;
    display.present(&frame)?;
    Ok(Some(name))
}

/// Record `name` as the active photo.
///
/// The existence check runs under the config lock, which a delete also holds
/// while removing files, so a deleted photo never becomes active.
fn activate(config: &ConfigStore, photos: &PhotoStore, name: &str) -> Result<Config, Error> {
    config.update(|cfg| {
        if !photos.exists(name) {
            return Err(Error::not_found(format!("photo '{}'", name)));
        }
        cfg.active_photo = Some(name.to_string());
        Ok(cfg.clone())
    })
}

/// The photo after `active` in `names`, wrapping; the first if `active` is
/// unset or gone.
pub fn next_photo<'a>(names: &[&'a str], active: Option<&str>) -> Option<&'a str> {
    let first = names.first().copied()?;
    let Some(active) = active else {
        return Some(first);
    };
    match names.iter().position(|n| *n == active) {
        Some(i) => Some(names[(i + 1) % names.len()]),
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Orientation;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Records the top-left pixel of every frame; optionally fails.
    #[derive(Default)]
    struct MockDisplay {
        seen: Mutex<Vec<[u8; 3]>>,
        fail: bool,
    }

    impl Display for MockDisplay {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn present(&self, image: &RgbImage) -> Result<(), Error> {
            if self.fail {
                return Err(Error::Display("panel on fire".to_string()));
            }
            self.seen.lock().unwrap().push(image.get_pixel(0, 0).0);
            Ok(())
        }
    }

    fn solid_png(color: [u8; 3]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(800, 480, Rgb(color)))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Arc<ConfigStore>,
        photos: Arc<PhotoStore>,
    }

    fn fixture(interval: u64, names: &[(&str, [u8; 3])]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let photos = Arc::new(PhotoStore::open(dir.path()).unwrap());
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")));
        for (name, color) in names {
            photos
                .add_cropped(&solid_png(*color), name, None, Orientation::Landscape, false)
                .unwrap();
        }
        config
            .update(|cfg| {
                cfg.cycle_interval = interval;
                cfg.photo_order = names.iter().map(|(n, _)| n.to_string()).collect();
                Ok(())
            })
            .unwrap();
        Fixture {
            _dir: dir,
            config,
            photos,
        }
    }

    #[test]
    fn test_next_photo_wraps() {
        let names = ["a.png", "b.png", "c.png"];
        assert_eq!(next_photo(&names, None), Some("a.png"));
        assert_eq!(next_photo(&names, Some("a.png")), Some("b.png"));
        assert_eq!(next_photo(&names, Some("c.png")), Some("a.png"));
        assert_eq!(next_photo(&names, Some("gone.png")), Some("a.png"));
        assert_eq!(next_photo(&[], Some("a.png")), None);
    }

    #[test]
    fn test_photo_deleted_after_pick_is_never_activated() {
        let f = fixture(60, &[("a.png", [9, 9, 9]), ("b.png", [8, 8, 8])]);
        let snapshot = f.config.snapshot();
        let list = f.photos.list(&snapshot.photo_order).unwrap();
        let names: Vec<&str> = list.iter().map(|p| p.name.as_str()).collect();
        let picked = next_photo(&names, None).unwrap().to_string();
        assert_eq!(picked, "a.png");

        assert!(f.photos.delete(&picked, &f.config).unwrap());
        let err = activate(&f.config, &f.photos, &picked).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(f.config.snapshot().active_photo, None);

        activate(&f.config, &f.photos, "b.png").unwrap();
        assert_eq!(f.config.snapshot().active_photo.as_deref(), Some("b.png"));
    }

    #[test]
    fn test_concurrent_deletes_never_leave_a_dangling_active_photo() {
        let names: Vec<(String, [u8; 3])> =
            (0..8).map(|i| (format!("p{}.png", i), [i as u8; 3])).collect();
        let refs: Vec<(&str, [u8; 3])> = names.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        let f = fixture(60, &refs);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for (name, _) in &names {
                    f.photos.delete(name, &f.config).unwrap();
                }
            });
            for (name, _) in names.iter().cycle().take(64) {
                let _ = activate(&f.config, &f.photos, name);
            }
        });

        if let Some(active) = f.config.snapshot().active_photo {
            assert!(f.photos.exists(&active), "{} is active but gone", active);
        }
    }

    #[tokio::test]
    async fn test_display_now_resets_next_fire() {
        let f = fixture(120, &[("a.png", [255, 0, 0])]);
        let display = Arc::new(MockDisplay::default());
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(f.config.clone(), f.photos.clone(), display.clone(), cancel.clone());

        handle.enable().unwrap();
        let before = Utc::now();
        handle.display_now("a.png").unwrap();

        let mut rx = handle.subscribe();
        let status = rx
            .wait_for(|s| s.presented == 1 && s.state == SchedulerState::Waiting)
            .await
            .unwrap()
            .clone();
        let next_fire = status.next_fire.unwrap();
        let expected = before + chrono::Duration::seconds(120);
        assert!((next_fire - expected).num_seconds().abs() <= 5, "{}", next_fire);
        assert_eq!(status.last_presented.as_deref(), Some("a.png"));
        assert_eq!(f.config.snapshot().active_photo.as_deref(), Some("a.png"));
        assert_eq!(display.seen.lock().unwrap().as_slice(), &[[255, 0, 0]]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_display_now_while_disabled_returns_to_idle() {
        let f = fixture(60, &[("a.png", [0, 0, 255])]);
        let display = Arc::new(MockDisplay::default());
        let (handle, _task) = spawn(f.config.clone(), f.photos.clone(), display, CancellationToken::new());

        handle.display_now("a.png").unwrap();
        let status = handle
            .subscribe()
            .wait_for(|s| s.presented == 1 && s.state == SchedulerState::Idle)
            .await
            .unwrap()
            .clone();
        assert_eq!(status.next_fire, None);
        assert!(!status.enabled);
    }

    #[tokio::test]
    async fn test_display_now_unknown_photo_records_error() {
        let f = fixture(60, &[]);
        let display = Arc::new(MockDisplay::default());
        let (handle, _task) = spawn(f.config.clone(), f.photos.clone(), display, CancellationToken::new());

        handle.display_now("ghost.png").unwrap();
        let status = handle
            .subscribe()
            .wait_for(|s| s.last_error.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(status.presented, 0);
        assert_eq!(f.config.snapshot().active_photo, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_in_order_and_wraps() {
        let f = fixture(
            60,
            &[("a.png", [255, 0, 0]), ("b.png", [0, 255, 0]), ("c.png", [0, 0, 255])],
        );
        let display = Arc::new(MockDisplay::default());
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(f.config.clone(), f.photos.clone(), display.clone(), cancel.clone());

        handle.enable().unwrap();
        handle
            .subscribe()
            .wait_for(|s| s.presented >= 4)
            .await
            .unwrap();
        cancel.cancel();
        task.await.unwrap();

        let seen = display.seen.lock().unwrap();
        assert_eq!(
            &seen[..4],
            &[[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 0, 0]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_recorded_and_cycling_continues() {
        let f = fixture(60, &[("a.png", [10, 10, 10])]);
        let display = Arc::new(MockDisplay {
            fail: true,
            ..MockDisplay::default()
        });
        let (handle, _task) = spawn(f.config.clone(), f.photos.clone(), display, CancellationToken::new());

        handle.enable().unwrap();
        let status = handle
            .subscribe()
            .wait_for(|s| s.last_error.is_some() && s.state == SchedulerState::Waiting)
            .await
            .unwrap()
            .clone();
        assert!(status.last_error.unwrap().contains("panel on fire"));
        assert!(status.next_fire.is_some());
        assert_eq!(status.presented, 0);
    }

    #[tokio::test]
    async fn test_interval_change_applies_to_next_wait() {
        let f = fixture(60, &[("a.png", [1, 2, 3])]);
        let display = Arc::new(MockDisplay::default());
        let (handle, _task) = spawn(f.config.clone(), f.photos.clone(), display, CancellationToken::new());

        handle.enable().unwrap();
        let mut rx = handle.subscribe();
        let first = rx
            .wait_for(|s| s.state == SchedulerState::Waiting)
            .await
            .unwrap()
            .next_fire
            .unwrap();

        f.config
            .update(|cfg| {
                cfg.cycle_interval = 600;
                Ok(())
            })
            .unwrap();
        assert_eq!(handle.status().next_fire, Some(first));

        handle.display_now("a.png").unwrap();
        let status = rx
            .wait_for(|s| s.presented == 1 && s.state == SchedulerState::Waiting)
            .await
            .unwrap()
            .clone();
        let gap = status.next_fire.unwrap() - status.last_presented_at.unwrap();
        assert!((gap.num_seconds() - 600).abs() <= 5, "{}", gap);
    }

    #[tokio::test]
    async fn test_disable_goes_idle_and_handle_reports_stopped_task() {
        let f = fixture(60, &[]);
        let cancel = CancellationToken::new();
        let (handle, task) = spawn(
            f.config.clone(),
            f.photos.clone(),
            Arc::new(MockDisplay::default()),
            cancel.clone(),
        );

        handle.enable().unwrap();
        handle.disable().unwrap();
        handle
            .subscribe()
            .wait_for(|s| s.state == SchedulerState::Idle && !s.enabled)
            .await
            .unwrap();
        assert_eq!(handle.status().next_fire, None);

        cancel.cancel();
        task.await.unwrap();
        assert!(matches!(handle.enable(), Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_starts_waiting_when_enabled_in_config() {
        let f = fixture(60, &[]);
        f.config
            .update(|cfg| {
                cfg.cycle_enabled = true;
                Ok(())
            })
            .unwrap();
        let (handle, _task) = spawn(
            f.config.clone(),
            f.photos.clone(),
            Arc::new(MockDisplay::default()),
            CancellationToken::new(),
        );
        let status = handle.status();
        assert_eq!(status.state, SchedulerState::Waiting);
        assert!(status.enabled);
    }
}
