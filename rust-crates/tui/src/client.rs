use crate::ui;
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use flowers::{
    Catalog,
    CatalogProvider,
    Direction,
    HistoryEntry,
    Reward,
    ScoreItem,
    ScoreStore,
    ScoreTier,
    SequenceEvent,
    Sequencer,
    Tracker,
    character::{
        CharacterEvent,
        CharacterStage,
    },
    model::DEFAULT_SCORE,
    scoring::{
        CharacterMood,
        resolve_tier,
        rewards_for_score,
    },
    sequencer::Phase,
    store::{
        LenientStore,
        SledScoreStore,
    },
};
use flowers_tui::{
    art::{
        ClipLibrary,
        TerminalClips,
    },
    settings::{
        Settings,
        SettingsStore,
        StorageMode,
    },
    storage::{
        CatalogSource,
        Storage,
    },
    sync_client::{
        RemoteCatalog,
        RemoteScoreStore,
        SyncClient,
    },
};
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::{
    path::PathBuf,
    time::{
        Duration,
        Instant,
    },
};
use tracing::{
    debug,
    error,
    info,
};

pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const MAX_ERRORS: usize = 50;
const DEFAULT_PROFILE: &str = "family";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub storage_mode: StorageMode,
    pub remote_url: Option<String>,
    pub profile: Option<String>,
    pub child_name: Option<String>,
    pub catalog_path: Option<PathBuf>,
    pub clips_dir: Option<PathBuf>,
    pub history_limit: usize,
}

/// Decorative clip and roll state of the running sequence.
#[derive(Clone, Debug)]
pub struct SequenceFrame {
    pub direction: Direction,
    pub item_label: String,
    pub displayed: u32,
    pub settled: bool,
    pub lines: Vec<String>,
    pub opacity: f32,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub child_name: Option<String>,
    pub score: u32,
    pub tier_name: Option<String>,
    pub mood: CharacterMood,
    pub rewards: Vec<Reward>,
    pub history: Vec<HistoryEntry>,
    pub increase_items: Vec<ScoreItem>,
    pub decrease_items: Vec<ScoreItem>,
    pub active_mode: StorageMode,
    pub saved_mode: StorageMode,
    pub storage_label: String,
    pub character_lines: Vec<String>,
    pub character_opacity: f32,
    pub sequence: Option<SequenceFrame>,
    pub busy: bool,
    pub now: DateTime<Utc>,
    pub status: String,
    pub errors: Vec<String>,
}

/// A committed adjustment whose animation is still running.
struct InFlight {
    direction: Direction,
    score_after: u32,
}

pub struct AppController<S = Storage> {
    tracker: Tracker<S>,
    catalog: CatalogSource,
    sequencer: Sequencer<TerminalClips>,
    character: CharacterStage<TerminalClips>,
    settings_store: SettingsStore,
    settings: Settings,
    active_mode: StorageMode,
    storage_label: String,
    rng: StdRng,
    in_flight: Option<InFlight>,
    score: u32,
    tiers: Vec<ScoreTier>,
    history: Vec<HistoryEntry>,
    increase_items: Vec<ScoreItem>,
    decrease_items: Vec<ScoreItem>,
    status: String,
    errors: Vec<String>,
}

impl AppController {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let settings_store = SettingsStore::new(&config.data_dir);
        let mut settings = settings_store
            .load()
            .map_err(|e| eyre!("{e:#}"))
            .wrap_err("loading settings")?;
        settings.storage_mode = config.storage_mode;
        if config.remote_url.is_some() {
            settings.remote_url = config.remote_url.clone();
        }
        if config.profile.is_some() {
            settings.profile = config.profile.clone();
        }
        if config.child_name.is_some() {
            settings.child_name = config.child_name.clone();
        }
        settings_store
            .save(&settings)
            .map_err(|e| eyre!("{e:#}"))
            .wrap_err("saving settings")?;

        let (storage, catalog, storage_label) = match config.storage_mode {
            StorageMode::Local => {
                let path = config.data_dir.join("store");
                let store = SledScoreStore::open(&path)
                    .map_err(|e| eyre!("{e:#}"))
                    .wrap_err_with(|| format!("opening local store at {}", path.display()))?
                    .with_history_limit(config.history_limit);
                let catalog = match &config.catalog_path {
                    Some(path) => Catalog::from_json_file(path)
                        .wrap_err_with(|| format!("loading catalog {}", path.display()))?,
                    None => Catalog::builtin(),
                };
                (
                    Storage::Local(LenientStore::new(store)),
                    CatalogSource::Local(catalog),
                    format!("{} ({})", StorageMode::Local, path.display()),
                )
            }
            StorageMode::Remote => {
                let url = settings
                    .remote_url
                    .clone()
                    .ok_or_else(|| eyre!("Remote storage needs --remote <url>"))?;
                let client = SyncClient::new(url)
                    .map_err(|e| eyre!("{e:#}"))
                    .wrap_err("configuring sync client")?;
                let user_id = settings.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
                let store =
                    RemoteScoreStore::connect(client.clone(), user_id, settings.child_name.as_deref())
                        .await
                        .map_err(|e| eyre!("{e:#}"))
                        .wrap_err("connecting to sync server")?;
                info!("using remote profile {} for {user_id}", store.profile_id());
                let label = format!("{} ({client}, profile {user_id})", StorageMode::Remote);
                (
                    Storage::Remote(store),
                    CatalogSource::Remote(RemoteCatalog::new(client)),
                    label,
                )
            }
        };

        let mut library = ClipLibrary::builtin();
        if let Some(dir) = &config.clips_dir {
            library = library.with_overrides(dir);
        }
        let tracker = Tracker::new(storage, config.history_limit);
        Ok(Self::from_parts(
            tracker,
            catalog,
            TerminalClips::new(library),
            settings_store,
            settings,
            storage_label,
        )
        .await)
    }
}

impl<S: ScoreStore> AppController<S> {
    /// The active storage mode is the one in `settings`.
    pub async fn from_parts(
        tracker: Tracker<S>,
        catalog: CatalogSource,
        clips: TerminalClips,
        settings_store: SettingsStore,
        settings: Settings,
        storage_label: String,
    ) -> Self {
        let score = match tracker.current_score().await {
            Ok(score) => score,
            Err(e) => {
                error!("reading initial score failed: {e:#}");
                DEFAULT_SCORE
            }
        };
        let now = Instant::now();
        let active_mode = settings.storage_mode;

        let mut controller = Self {
            tracker,
            catalog,
            sequencer: Sequencer::new(clips.clone()),
            character: CharacterStage::new(clips, score, now),
            settings_store,
            settings,
            active_mode,
            storage_label,
            rng: StdRng::from_os_rng(),
            in_flight: None,
            score,
            tiers: Vec::new(),
            history: Vec::new(),
            increase_items: Vec::new(),
            decrease_items: Vec::new(),
            status: String::from("Ready"),
            errors: Vec::new(),
        };
        controller.refresh_catalog().await;
        controller.refresh_history().await;
        controller
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    fn push_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.errors.push(message);
        if self.errors.len() > MAX_ERRORS {
            let drain = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..drain);
        }
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn is_busy(&self) -> bool {
        !self.sequencer.is_idle()
    }

    pub async fn refresh_catalog(&mut self) {
        self.catalog.refresh();
        let loaded = async {
            let increase = self.catalog.increase_items().await?;
            let decrease = self.catalog.decrease_items().await?;
            let tiers = self.catalog.tiers().await?;
            anyhow::Ok((increase, decrease, tiers))
        }
        .await;
        match loaded {
            Ok((increase, decrease, tiers)) => {
                self.increase_items = increase;
                self.decrease_items = decrease;
                self.tiers = tiers;
            }
            Err(e) => self.push_error(format!("Loading items failed: {e:#}")),
        }
    }

    pub async fn refresh_history(&mut self) {
        match self.tracker.history().await {
            Ok(history) => self.history = history,
            Err(e) => self.push_error(format!("Loading history failed: {e:#}")),
        }
    }

    /// Commit an adjustment, then start its animation.
    pub async fn adjust(&mut self, direction: Direction, index: usize, now: Instant) {
        if self.is_busy() {
            debug!("adjustment ignored while a sequence runs");
            return;
        }
        let items = match direction {
            Direction::Increase => &self.increase_items,
            Direction::Decrease => &self.decrease_items,
        };
        let Some(item) = items.get(index).cloned() else {
            self.push_error(format!("No {direction} item at position {}", index + 1));
            return;
        };
        match self.tracker.adjust(direction, &item, &mut self.rng).await {
            Ok(adjustment) => {
                self.score = adjustment.entry.score_after;
                self.in_flight = Some(InFlight {
                    direction,
                    score_after: adjustment.entry.score_after,
                });
                self.set_status(format!(
                    "{} {}: {}",
                    direction.sign(),
                    adjustment.entry.magnitude,
                    item.name
                ));
                if !self.sequencer.start(adjustment.trigger, now) {
                    self.finish_sequence();
                }
            }
            Err(e) => {
                self.push_error(format!("Saving the adjustment failed: {e:#}"));
                // the score may have been written without its history entry
                self.reload_score(now).await;
                self.refresh_history().await;
            }
        }
    }

    /// Drive the sequencer and the character stage up to `now`.
    pub async fn advance(&mut self, now: Instant) {
        for event in self.sequencer.advance(now) {
            match event {
                SequenceEvent::RollingComplete => {
                    if let Some(in_flight) = &self.in_flight {
                        let (direction, score) = (in_flight.direction, in_flight.score_after);
                        self.character.react(direction, now);
                        self.character.set_score(score, now);
                    }
                }
                SequenceEvent::SequenceComplete => {
                    self.finish_sequence();
                    self.refresh_history().await;
                }
            }
        }
        for event in self.character.advance(now) {
            match event {
                CharacterEvent::ReactionFinished(direction) => {
                    debug!("{direction} reaction finished");
                }
            }
        }
    }

    fn finish_sequence(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            self.score = in_flight.score_after;
            self.character.set_score(self.score, Instant::now());
        }
    }

    /// Persist the storage mode for the next start.
    pub fn save_storage_mode(&mut self, mode: StorageMode) {
        if mode == StorageMode::Remote && self.settings.remote_url.is_none() {
            self.push_error("Start once with --remote <url> to configure the sync server");
            return;
        }
        let mut settings = self.settings.clone();
        settings.storage_mode = mode;
        match self.settings_store.save(&settings) {
            Ok(()) => {
                self.settings = settings;
                info!("storage mode set to {mode:?}");
                if mode == self.active_mode {
                    self.set_status(format!("Storage: {mode}"));
                } else {
                    self.set_status(format!("Storage: {mode} (takes effect after restart)"));
                }
            }
            Err(e) => self.push_error(format!("Saving settings failed: {e:#}")),
        }
    }

    pub async fn reset_all(&mut self, now: Instant) {
        self.sequencer.cancel();
        self.in_flight = None;
        match self.tracker.reset().await {
            Ok(()) => {
                self.reload_score(now).await;
                self.set_status("All data reset");
            }
            Err(e) => self.push_error(format!("Reset failed: {e:#}")),
        }
        self.refresh_history().await;
    }

    async fn reload_score(&mut self, now: Instant) {
        match self.tracker.current_score().await {
            Ok(score) => {
                self.score = score;
                self.character.set_score(score, now);
            }
            Err(e) => self.push_error(format!("Reading the score failed: {e:#}")),
        }
    }

    pub fn snapshot(&self, now: Instant) -> AppSnapshot {
        let sequence = self.sequencer.view(now).map(|view| SequenceFrame {
            direction: view.trigger.direction,
            item_label: view.trigger.item_label.clone(),
            displayed: view.displayed,
            settled: view.phase != Phase::Rolling,
            lines: view
                .clip
                .map(|clip| clip.frame_at(now).to_vec())
                .unwrap_or_default(),
            opacity: view.opacity,
        });
        AppSnapshot {
            child_name: self.settings.child_name.clone(),
            score: self.score,
            tier_name: resolve_tier(self.score, &self.tiers).map(|tier| tier.name.clone()),
            mood: CharacterMood::for_score(self.score),
            rewards: rewards_for_score(self.score, &self.tiers),
            history: self.history.clone(),
            increase_items: self.increase_items.clone(),
            decrease_items: self.decrease_items.clone(),
            active_mode: self.active_mode,
            saved_mode: self.settings.storage_mode,
            storage_label: self.storage_label.clone(),
            character_lines: self
                .character
                .handle()
                .map(|clip| clip.frame_at(now).to_vec())
                .unwrap_or_default(),
            character_opacity: self.character.opacity(now),
            sequence,
            busy: self.is_busy(),
            now: Utc::now(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let controller = AppController::new(config).await?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(controller, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    let mut frames = tokio::time::interval(FRAME_INTERVAL);
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                let now = Instant::now();
                controller.advance(now).await;
                ui::draw(ui_state, &controller.snapshot(now))
                    .wrap_err("draw frame failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, exiting");
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                let now = Instant::now();
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::Adjust { direction, index } => {
                        controller.adjust(direction, index, now).await;
                    }
                    ui::UserEvent::SaveStorageMode(mode) => {
                        controller.save_storage_mode(mode);
                    }
                    ui::UserEvent::ResetAll => controller.reset_all(now).await,
                    ui::UserEvent::RefreshCatalog => {
                        controller.refresh_catalog().await;
                        controller.refresh_history().await;
                        controller.set_status("Items and history reloaded");
                    }
                    ui::UserEvent::DismissErrors => controller.clear_errors(),
                }
                ui::draw(ui_state, &controller.snapshot(now))
                    .wrap_err("draw after input failed")?;
            }
        }
    }
    Ok(())
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use flowers::store::{
        DEFAULT_HISTORY_LIMIT,
        InMemoryScoreStore,
    };
    use tempdir::TempDir;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    async fn controller<S: ScoreStore>(store: S, tmp: &TempDir) -> AppController<S> {
        AppController::from_parts(
            Tracker::new(store, DEFAULT_HISTORY_LIMIT),
            CatalogSource::Local(Catalog::builtin()),
            TerminalClips::new(ClipLibrary::builtin()),
            SettingsStore::new(tmp.path()),
            Settings::default(),
            "test".to_string(),
        )
        .await
    }

    /// Keeps the score but refuses every history append.
    struct NoHistoryStore(InMemoryScoreStore);

    impl ScoreStore for NoHistoryStore {
        async fn score(&self) -> anyhow::Result<u32> {
            self.0.score().await
        }

        async fn set_score(&mut self, score: u32) -> anyhow::Result<()> {
            self.0.set_score(score).await
        }

        async fn append_history(&mut self, _entry: &HistoryEntry) -> anyhow::Result<()> {
            Err(anyhow!("history full"))
        }

        async fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
            self.0.history().await
        }

        async fn clear_all(&mut self) -> anyhow::Result<()> {
            self.0.clear_all().await
        }
    }

    #[tokio::test]
    async fn new__local_mode_opens_store_with_builtin_catalog() {
        // given
        let tmp = TempDir::new("controller").unwrap();
        let config = AppConfig {
            data_dir: tmp.path().to_path_buf(),
            storage_mode: StorageMode::Local,
            remote_url: None,
            profile: None,
            child_name: Some("Mia".to_string()),
            catalog_path: None,
            clips_dir: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
        };

        // when
        let sut = AppController::new(config).await.unwrap();

        // then
        let snap = sut.snapshot(Instant::now());
        assert_eq!(snap.score, DEFAULT_SCORE);
        assert_eq!(snap.child_name.as_deref(), Some("Mia"));
        assert_eq!(snap.increase_items.len(), 6);
        assert_eq!(snap.active_mode, StorageMode::Local);
        assert!(SettingsStore::new(tmp.path()).path().exists());
    }

    #[tokio::test]
    async fn adjust__shows_committed_score_and_completes_sequence() {
        // given
        let tmp = TempDir::new("controller").unwrap();
        let store = InMemoryScoreStore::with_score(100);
        let mut sut = controller(store.clone(), &tmp).await;
        let t0 = Instant::now();

        // when
        sut.adjust(Direction::Decrease, 0, t0).await;

        // then
        let committed = store.score().await.unwrap();
        assert!((97..=99).contains(&committed));
        let snap = sut.snapshot(t0);
        assert!(snap.busy);
        assert_eq!(snap.score, committed);
        assert!(snap.sequence.is_some());

        sut.advance(t0 + ms(1000)).await;
        assert_eq!(sut.character.reaction(), Some(Direction::Decrease));
        assert!(sut.is_busy());

        sut.advance(t0 + ms(3900)).await;
        let snap = sut.snapshot(t0 + ms(3900));
        assert!(!snap.busy);
        assert!(snap.sequence.is_none());
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].score_after, committed);
    }

    #[tokio::test]
    async fn adjust__while_busy_is_ignored() {
        // given
        let tmp = TempDir::new("controller").unwrap();
        let store = InMemoryScoreStore::with_score(100);
        let mut sut = controller(store.clone(), &tmp).await;
        let t0 = Instant::now();
        sut.adjust(Direction::Decrease, 0, t0).await;

        // when
        sut.adjust(Direction::Decrease, 0, t0 + ms(10)).await;

        // then
        assert_eq!(store.history().await.unwrap().len(), 1);
        assert!(sut.errors.is_empty());
    }

    #[tokio::test]
    async fn adjust__rejected_sequence_still_settles_score() {
        // given
        let tmp = TempDir::new("controller").unwrap();
        let mut sut = controller(InMemoryScoreStore::with_score(50), &tmp).await;
        sut.decrease_items = vec![ScoreItem::new("blank", "  ", 2, 2)];

        // when
        sut.adjust(Direction::Decrease, 0, Instant::now()).await;

        // then
        assert!(!sut.is_busy());
        assert!(sut.in_flight.is_none());
        assert_eq!(sut.score, 48);
        assert_eq!(sut.character.score(), 48);
    }

    #[tokio::test]
    async fn adjust__when_history_fails_then_score_is_reloaded() {
        // given
        let tmp = TempDir::new("controller").unwrap();
        let store = InMemoryScoreStore::with_score(100);
        let mut sut = controller(NoHistoryStore(store.clone()), &tmp).await;

        // when
        sut.adjust(Direction::Decrease, 0, Instant::now()).await;

        // then
        let stored = store.score().await.unwrap();
        assert!(stored < 100);
        assert_eq!(sut.score, stored);
        assert_eq!(sut.character.score(), stored);
        assert!(!sut.is_busy());
        assert_eq!(sut.errors.len(), 1);
    }

    #[tokio::test]
    async fn reset_all__cancels_running_sequence() {
        // given
        let tmp = TempDir::new("controller").unwrap();
        let store = InMemoryScoreStore::with_score(70);
        let mut sut = controller(store.clone(), &tmp).await;
        let t0 = Instant::now();
        sut.adjust(Direction::Increase, 0, t0).await;
        sut.advance(t0 + ms(500)).await;

        // when
        sut.reset_all(t0 + ms(500)).await;
        sut.advance(t0 + ms(4000)).await;

        // then
        assert!(!sut.is_busy());
        assert!(sut.in_flight.is_none());
        assert_eq!(sut.score, DEFAULT_SCORE);
        assert!(sut.history.is_empty());
        assert!(store.history().await.unwrap().is_empty());
    }
}
