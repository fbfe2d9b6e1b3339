use iced::widget::{
    button, canvas, column, container, horizontal_space, image as image_widget, progress_bar, row,
    scrollable, text, Column,
};
use iced::{event, window, Alignment, Element, Event, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn, Level};

use tourforge::capture::camera::{Camera, FacingMode, FolderSource, FrameSource, SyntheticSource};
use tourforge::capture::controller::{
    BackgroundSignal, CaptureController, CaptureOutcome, CaptureTrigger, CaptureWarning,
};
use tourforge::capture::geo::NoGeolocation;
use tourforge::capture::sensor::SensorHub;
use tourforge::capture::session::SessionState;
use tourforge::config::AppConfig;
use tourforge::error::TourError;
use tourforge::export::engine::{ExportEngine, ExportResult};
use tourforge::export::profile::PlatformRegistry;
use tourforge::logging;
use tourforge::state::data::Tour;
use tourforge::state::library::TourStore;

mod ui;

/// Degrees the "Turn" button rotates the simulated heading
const SIMULATED_TURN_DEGREES: f64 = 15.0;

/// A library error flattened for messages; misuse means a UI bug
#[derive(Debug, Clone)]
struct Failure {
    message: String,
    misuse: bool,
}

impl From<TourError> for Failure {
    fn from(err: TourError) -> Self {
        Self {
            misuse: err.is_misuse(),
            message: err.to_string(),
        }
    }
}

/// What the capture screen shows; refreshed after every controller call
#[derive(Debug, Clone, Default)]
struct CaptureStatus {
    room: String,
    captures_in_room: usize,
    max_captures: usize,
    progress: f32,
    room_active: bool,
    can_advance: bool,
    can_retreat: bool,
    last_room: bool,
    camera_ready: bool,
}

/// A tour on the result screen
struct ResultView {
    tour: Tour,
    /// Not yet in the store; the save can be retried
    pending_save: bool,
    zoom: f32,
    offset: cgmath::Vector2<f32>,
}

enum Screen {
    Home,
    Capture,
    Result(Box<ResultView>),
}

/// Main application state
struct TourForge {
    config: AppConfig,
    store: Option<TourStore>,
    engine: ExportEngine,
    tours: Vec<Tour>,
    screen: Screen,
    /// Stills folder used instead of the synthetic camera
    frame_folder: Option<PathBuf>,
    sensors: SensorHub,
    simulated_heading: f64,
    controller: Option<Arc<Mutex<CaptureController>>>,
    /// Reachable while a capture holds the controller
    background: Option<BackgroundSignal>,
    capture_status: CaptureStatus,
    prompt: String,
    /// Transient warning or error shown under the current screen
    toast: Option<String>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    NewTour,
    PickFrameFolder,
    OpenTour(i64),
    DeleteTour(i64),
    Capture,
    Captured(Result<CaptureOutcome, Failure>),
    Turn,
    SwitchCamera,
    AutoPolled(Result<Option<CaptureOutcome>, Failure>),
    NextRoom,
    PreviousRoom,
    CancelCapture,
    RetrySave,
    Export(String),
    Exported(ExportResult),
    ExportGeneric(&'static str),
    GenericSaved(Result<PathBuf, Failure>),
    PlanZoom(f32),
    PlanPan(cgmath::Vector2<f32>),
    BackHome,
    WindowFocused(bool),
}

impl TourForge {
    fn new() -> (Self, Task<Message>) {
        let config = AppConfig::load().unwrap_or_else(|err| {
            warn!("⚠️  Using default configuration: {}", err);
            AppConfig::default()
        });

        let mut toast = None;
        let store = match TourStore::open(config.database_path()) {
            Ok(store) => Some(store),
            Err(err) => {
                error!("❌ Tour store unavailable: {}", err);
                toast = Some(format!("Tours cannot be saved: {}", err));
                None
            }
        };
        let engine = ExportEngine::new(PlatformRegistry::builtin(), config.export_dir());

        let mut app = TourForge {
            config,
            store,
            engine,
            tours: Vec::new(),
            screen: Screen::Home,
            frame_folder: None,
            sensors: SensorHub::new(),
            simulated_heading: 0.0,
            controller: None,
            background: None,
            capture_status: CaptureStatus::default(),
            prompt: String::new(),
            toast,
        };
        app.reload_tours();
        info!("🏠 TourForge initialized with {} tours", app.tours.len());

        (app, Task::none())
    }

    fn reload_tours(&mut self) {
        let Some(store) = &self.store else { return };
        match store.list() {
            Ok(mut tours) => {
                tours.reverse();
                self.tours = tours;
            }
            Err(err) => self.toast = Some(format!("Could not read tours: {}", err)),
        }
    }

    /// Misuse is a UI bug: loud in debug builds, logged and ignored in release
    fn report(&mut self, failure: Failure) {
        if failure.misuse {
            debug_assert!(false, "capture flow misuse: {}", failure.message);
            error!("capture flow misuse ignored: {}", failure.message);
        } else {
            self.toast = Some(failure.message);
        }
    }

    fn new_controller(&self) -> CaptureController {
        let source: Box<dyn FrameSource> = match &self.frame_folder {
            Some(folder) => Box::new(FolderSource::new(folder.clone())),
            None => Box::new(SyntheticSource::new(1280, 960)),
        };
        CaptureController::new(
            self.config.session_config(),
            Camera::new(source, self.config.frame_quality),
            Arc::new(self.sensors.clone()),
        )
        .with_geolocation(Arc::new(NoGeolocation), self.config.geolocation_timeout())
    }

    /// Run a synchronous controller call unless a capture holds the controller
    fn with_controller<T>(&mut self, f: impl FnOnce(&mut CaptureController) -> T) -> Option<T> {
        let controller = self.controller.clone()?;
        let result = match controller.try_lock() {
            Ok(mut guard) => {
                let result = f(&mut *guard);
                self.capture_status = status_of(&*guard);
                Some(result)
            }
            Err(_) => None,
        };
        if result.is_none() {
            self.toast = Some(CaptureWarning::CaptureInProgress.message().to_string());
        }
        result
    }

    /// Apply the focus state to the camera and refresh the status. A capture
    /// in flight applies it itself when it finishes.
    fn sync_background(&mut self) {
        let Some(controller) = self.controller.clone() else { return };
        let synced = match controller.try_lock() {
            Ok(mut guard) => {
                let synced = guard.sync_background();
                self.capture_status = status_of(&*guard);
                synced
            }
            Err(_) => Ok(()),
        };
        if let Err(err) = synced {
            self.report(err.into());
        }
    }

    fn apply_outcome(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Captured { prompt, .. } => {
                self.prompt = prompt;
                self.toast = None;
            }
            CaptureOutcome::Rejected(warning) => self.toast = Some(warning.message().to_string()),
        }
    }

    /// Turn the completed session into a tour and try to store it
    fn finish_capture(&mut self) {
        let Some(finalized) = self.with_controller(|c| c.finalize_tour()) else { return };
        match finalized {
            Ok(tour) => {
                self.controller = None;
                self.background = None;
                let mut view = ResultView {
                    tour,
                    pending_save: true,
                    zoom: 1.0,
                    offset: cgmath::Vector2::new(0.0, 0.0),
                };
                self.save_result(&mut view);
                self.screen = Screen::Result(Box::new(view));
            }
            Err(err) => self.report(err.into()),
        }
    }

    fn save_result(&mut self, view: &mut ResultView) {
        let saved = match self.store.as_mut() {
            Some(store) => store.save(&view.tour),
            None => Err(TourError::StorageFailure("tour store is not open".into())),
        };
        match saved {
            Ok(id) => {
                view.pending_save = false;
                self.toast = Some(format!("Saved \"{}\"", view.tour.display_name));
                info!(tour_id = id, "tour saved");
                self.reload_tours();
            }
            Err(err) => {
                view.pending_save = true;
                warn!("⚠️  Tour kept in memory, save failed: {}", err);
                self.toast = Some(format!("Could not save the tour: {}", err));
            }
        }
    }

    fn result_tour(&self) -> Option<Tour> {
        match &self.screen {
            Screen::Result(view) => Some(view.tour.clone()),
            _ => None,
        }
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::NewTour => {
                let mut controller = self.new_controller();
                self.simulated_heading = 0.0;
                self.sensors.reset();
                match controller.start() {
                    Ok(prompt) => {
                        self.prompt = prompt;
                        self.toast = (!controller.camera_ready())
                            .then(|| "Camera unavailable, shots cannot be taken.".to_string());
                        self.capture_status = status_of(&controller);
                        self.background = Some(controller.background_signal());
                        self.controller = Some(Arc::new(Mutex::new(controller)));
                        self.screen = Screen::Capture;
                    }
                    Err(err) => self.report(err.into()),
                }
                Task::none()
            }
            Message::PickFrameFolder => {
                let folder = FileDialog::new()
                    .set_title("Select a folder of room photos")
                    .pick_folder();
                if let Some(folder) = folder {
                    self.toast = Some(format!("Frames will come from {}", folder.display()));
                    self.frame_folder = Some(folder);
                }
                Task::none()
            }
            Message::OpenTour(id) => {
                if let Some(tour) = self.tours.iter().find(|t| t.id == id).cloned() {
                    self.screen = Screen::Result(Box::new(ResultView {
                        tour,
                        pending_save: false,
                        zoom: 1.0,
                        offset: cgmath::Vector2::new(0.0, 0.0),
                    }));
                    self.toast = None;
                }
                Task::none()
            }
            Message::DeleteTour(id) => {
                if let Some(store) = self.store.as_mut() {
                    if let Err(err) = store.delete(id) {
                        self.toast = Some(format!("Could not delete the tour: {}", err));
                    }
                }
                self.reload_tours();
                Task::none()
            }
            Message::Capture => {
                let Some(controller) = self.controller.clone() else { return Task::none() };
                match controller.try_lock_owned() {
                    Ok(mut guard) => Task::perform(
                        async move {
                            guard
                                .capture(CaptureTrigger::Manual)
                                .await
                                .map_err(Failure::from)
                        },
                        Message::Captured,
                    ),
                    Err(_) => {
                        self.toast = Some(CaptureWarning::CaptureInProgress.message().to_string());
                        Task::none()
                    }
                }
            }
            Message::Captured(result) => {
                match result {
                    Ok(outcome) => self.apply_outcome(outcome),
                    Err(failure) => self.report(failure),
                }
                self.sync_background();
                Task::none()
            }
            Message::Turn => {
                self.simulated_heading = (self.simulated_heading + SIMULATED_TURN_DEGREES).rem_euclid(360.0);
                self.sensors.push_orientation(self.simulated_heading);

                let Some(controller) = self.controller.clone() else { return Task::none() };
                match controller.try_lock_owned() {
                    Ok(mut guard) => Task::perform(
                        async move { guard.poll_auto_capture().await.map_err(Failure::from) },
                        Message::AutoPolled,
                    ),
                    Err(_) => Task::none(),
                }
            }
            Message::SwitchCamera => {
                if let Some(result) = self.with_controller(|c| c.switch_camera()) {
                    match result {
                        Ok(facing) => {
                            let lens = match facing {
                                FacingMode::Environment => "rear",
                                FacingMode::User => "front",
                            };
                            self.toast = Some(format!("Using the {} camera", lens));
                        }
                        Err(err) => self.report(err.into()),
                    }
                }
                Task::none()
            }
            Message::AutoPolled(result) => {
                match result {
                    Ok(Some(outcome)) => self.apply_outcome(outcome),
                    Ok(None) => {}
                    Err(failure) => self.report(failure),
                }
                self.sync_background();
                Task::none()
            }
            Message::NextRoom => {
                if let Some(result) = self.with_controller(|c| c.advance_room()) {
                    match result {
                        Ok(prompt) => {
                            self.prompt = prompt;
                            self.toast = None;
                        }
                        Err(err) => self.report(err.into()),
                    }
                }
                if self.capture_status_is(SessionState::SessionComplete) {
                    self.finish_capture();
                }
                Task::none()
            }
            Message::PreviousRoom => {
                if let Some(result) = self.with_controller(|c| c.retreat_room()) {
                    match result {
                        Ok(Some(prompt)) => self.prompt = prompt,
                        Ok(None) => {}
                        Err(err) => self.report(err.into()),
                    }
                }
                Task::none()
            }
            Message::CancelCapture => {
                if self.with_controller(|c| c.cancel()).is_some() {
                    self.controller = None;
                    self.background = None;
                    self.screen = Screen::Home;
                    self.toast = None;
                }
                Task::none()
            }
            Message::RetrySave => {
                if matches!(self.screen, Screen::Result(_)) {
                    if let Screen::Result(mut view) = std::mem::replace(&mut self.screen, Screen::Home) {
                        self.save_result(&mut view);
                        self.screen = Screen::Result(view);
                    }
                }
                Task::none()
            }
            Message::Export(platform) => {
                let Some(tour) = self.result_tour() else { return Task::none() };
                let engine = self.engine.clone();
                self.toast = Some(format!("Preparing the tour for {}…", platform));
                Task::perform(
                    async move { engine.export_to_platform(&tour, &platform).await },
                    Message::Exported,
                )
            }
            Message::Exported(result) => {
                self.toast = Some(match (&result.download_reference, result.success) {
                    (Some(path), true) => format!("{} Saved to {}", result.message, path.display()),
                    _ => result.message.clone(),
                });
                if let Some(url) = result.submission_url {
                    info!("🔗 Submission link: {}", url);
                }
                Task::none()
            }
            Message::ExportGeneric(format) => {
                let Some(tour) = self.result_tour() else { return Task::none() };
                let engine = self.engine.clone();
                Task::perform(save_generic(engine, tour, format), Message::GenericSaved)
            }
            Message::GenericSaved(result) => {
                match result {
                    Ok(path) => self.toast = Some(format!("Saved to {}", path.display())),
                    Err(failure) => self.toast = Some(failure.message),
                }
                Task::none()
            }
            Message::PlanZoom(delta) => {
                if let Screen::Result(view) = &mut self.screen {
                    view.zoom = (view.zoom * (1.0 + delta)).clamp(0.25, 8.0);
                }
                Task::none()
            }
            Message::PlanPan(delta) => {
                if let Screen::Result(view) = &mut self.screen {
                    view.offset += delta;
                }
                Task::none()
            }
            Message::BackHome => {
                if let Screen::Result(view) = &self.screen {
                    if view.pending_save {
                        warn!(tour_id = view.tour.id, "unsaved tour discarded");
                    }
                }
                self.screen = Screen::Home;
                self.toast = None;
                Task::none()
            }
            Message::WindowFocused(focused) => {
                if let Some(signal) = &self.background {
                    signal.set(!focused);
                    self.sync_background();
                }
                Task::none()
            }
        }
    }

    fn capture_status_is(&self, state: SessionState) -> bool {
        match &self.controller {
            Some(controller) => controller
                .try_lock()
                .map(|guard| guard.session().state() == state)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let body = match &self.screen {
            Screen::Home => self.view_home(),
            Screen::Capture => self.view_capture(),
            Screen::Result(view) => self.view_result(view),
        };

        let toast = self.toast.as_deref().map(|message| text(message).size(14));

        container(column![body].push_maybe(toast).spacing(16).padding(24))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn view_home(&self) -> Element<Message> {
        let mut list = Column::new().spacing(8);
        for tour in &self.tours {
            let preview: Element<Message> = if tour.preview_image.is_empty() {
                horizontal_space().width(96).into()
            } else {
                image_widget(image_widget::Handle::from_bytes(tour.preview_image.clone()))
                    .width(96)
                    .into()
            };
            list = list.push(
                row![
                    preview,
                    column![
                        text(&tour.display_name).size(18),
                        text(format!(
                            "{} rooms · {} photos · {} m²",
                            tour.rooms.len(),
                            tour.images.len(),
                            tourforge::export::description::format_area(tour.total_area())
                        ))
                        .size(13),
                    ]
                    .spacing(4),
                    horizontal_space(),
                    button("Open").on_press(Message::OpenTour(tour.id)),
                    button("Delete").on_press(Message::DeleteTour(tour.id)),
                ]
                .spacing(12)
                .align_y(Alignment::Center),
            );
        }
        if self.tours.is_empty() {
            list = list.push(text("No tours yet.").size(14));
        }

        let source = match &self.frame_folder {
            Some(folder) => format!("Frames: {}", folder.display()),
            None => "Frames: test pattern".to_string(),
        };

        column![
            text("TourForge").size(40),
            row![
                button("New tour").on_press(Message::NewTour).padding(10),
                button("Use photo folder…").on_press(Message::PickFrameFolder).padding(10),
                text(source).size(13),
            ]
            .spacing(12)
            .align_y(Alignment::Center),
            scrollable(list).height(Length::Fill),
        ]
        .spacing(20)
        .into()
    }

    fn view_capture(&self) -> Element<Message> {
        let status = &self.capture_status;
        let next_label = if status.last_room { "Finish" } else { "Next room" };

        column![
            text(&status.room).size(36),
            text(format!("{} / {} shots", status.captures_in_room, status.max_captures)).size(16),
            progress_bar(0.0..=100.0, status.progress).height(8),
            text(&self.prompt).size(16),
            row![
                button("Capture")
                    .on_press_maybe((status.room_active && status.camera_ready).then_some(Message::Capture))
                    .padding(12),
                button("Turn").on_press(Message::Turn).padding(12),
                button("Switch camera")
                    .on_press_maybe(status.camera_ready.then_some(Message::SwitchCamera))
                    .padding(12),
                horizontal_space(),
                button("Previous room").on_press_maybe(status.can_retreat.then_some(Message::PreviousRoom)),
                button(next_label).on_press_maybe(status.can_advance.then_some(Message::NextRoom)),
                button("Cancel").on_press(Message::CancelCapture),
            ]
            .spacing(12)
            .align_y(Alignment::Center),
        ]
        .spacing(16)
        .into()
    }

    fn view_result<'a>(&'a self, view: &'a ResultView) -> Element<'a, Message> {
        let plan = canvas(ui::floor_plan::FloorPlanView {
            rooms: &view.tour.rooms,
            zoom: view.zoom,
            offset: view.offset,
        })
        .width(Length::FillPortion(3))
        .height(Length::Fill);

        let rooms = view.tour.rooms.iter().fold(Column::new().spacing(6), |col, room| {
            col.push(text(format!(
                "{} · {} m² · {} photos",
                room.name,
                tourforge::export::description::format_area(room.area_sq_m),
                view.tour.images_in_room(&room.name).count()
            )))
        });

        let platforms = self.engine.registry().profiles().fold(Column::new().spacing(6), |col, profile| {
            col.push(
                button(text(format!("Export to {}", profile.display_name)))
                    .on_press(Message::Export(profile.platform_id.clone()))
                    .width(Length::Fill),
            )
        });

        let retry = view
            .pending_save
            .then(|| button("Retry save").on_press(Message::RetrySave));

        column![
            row![
                text(&view.tour.display_name).size(32),
                horizontal_space(),
                button("Home").on_press(Message::BackHome),
            ]
            .align_y(Alignment::Center),
            row![
                plan,
                column![
                    rooms,
                    platforms,
                    button("Save archive").on_press(Message::ExportGeneric("zip")).width(Length::Fill),
                    button("Save JSON").on_press(Message::ExportGeneric("json")).width(Length::Fill),
                ]
                .push_maybe(retry)
                .spacing(16)
                .width(Length::FillPortion(1)),
            ]
            .spacing(16)
            .height(Length::Fill),
        ]
        .spacing(16)
        .into()
    }

    fn subscription(&self) -> Subscription<Message> {
        event::listen_with(|event, _status, _window| match event {
            Event::Window(window::Event::Focused) => Some(Message::WindowFocused(true)),
            Event::Window(window::Event::Unfocused) => Some(Message::WindowFocused(false)),
            _ => None,
        })
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn status_of(controller: &CaptureController) -> CaptureStatus {
    let session = controller.session();
    CaptureStatus {
        room: session.current_room().unwrap_or_default().to_string(),
        captures_in_room: session.captures_in_current_room(),
        max_captures: session.max_captures_per_room(),
        progress: session.progress_percent() as f32,
        room_active: session.state() == SessionState::RoomActive,
        can_advance: session.can_advance(),
        can_retreat: session.can_retreat(),
        last_room: session.is_last_room(),
        camera_ready: controller.camera_ready(),
    }
}

/// Package a tour without a site profile and write it to the export folder
async fn save_generic(engine: ExportEngine, tour: Tour, format: &'static str) -> Result<PathBuf, Failure> {
    let package = engine.export_generic(&tour, format)?;
    Ok(engine.save_to_device(&package).await?)
}

fn main() -> iced::Result {
    let json_logs = std::env::var_os("TOURFORGE_LOG_JSON").is_some();
    logging::init_tracing(json_logs, Level::INFO);

    iced::application("TourForge", TourForge::update, TourForge::view)
        .subscription(TourForge::subscription)
        .theme(TourForge::theme)
        .centered()
        .run_with(TourForge::new)
}
