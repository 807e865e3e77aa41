//! One editing and simulation session: editor, controller and engine tied
//! together by the event bus.

use std::sync::Arc;

use alien_changer::{ChangerConfig, MonitorData, SimulationChanger};
use alien_core::{
    ConfigError, DataDescription, DataEditor, DescriptionHelper, IdGenerator, IntRect,
    LocalDescriptionHelper, Notification, Receiver, SettingsStore, SimulationController,
    SimulationParameters, SnapshotHistory, UpdateDescription,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::SessionError;
use crate::command::{
    EngineEvent, EventReceiver, EventSubmit, create_event_bus, drain_pending_events,
    make_event_submit,
};
use crate::control::{self, KnobEntry, KnobUpdate};
use crate::engine::LocalEngine;

const CHANGER_ACTIVE_STATE: &str = "parameter_changer_active";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub world_size: (i32, i32),
    /// Single steps that can be undone.
    pub history_capacity: usize,
    pub event_capacity: usize,
    pub changer: ChangerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            world_size: (600, 300),
            history_capacity: 64,
            event_capacity: 256,
            changer: ChangerConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world_size.0 <= 0 || self.world_size.1 <= 0 {
            return Err(ConfigError::InvalidConfig("world_size must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidConfig("event_capacity must be positive"));
        }
        self.changer.validate()
    }
}

/// What a pass over the event bus did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpReport {
    pub snapshots: usize,
    pub samples: usize,
    pub parameter_changes: usize,
    pub flushes: usize,
    pub view_updates: usize,
}

impl PumpReport {
    fn absorb(&mut self, other: Self) {
        self.snapshots += other.snapshots;
        self.samples += other.samples;
        self.parameter_changes += other.parameter_changes;
        self.flushes += other.flushes;
        self.view_updates += other.view_updates;
    }
}

pub struct Session {
    config: SessionConfig,
    ids: Arc<IdGenerator>,
    helper: LocalDescriptionHelper,
    editor: DataEditor,
    changer: SimulationChanger,
    engine: LocalEngine,
    events: EventReceiver,
    submit: EventSubmit,
    history: SnapshotHistory,
    settings: SettingsStore,
    last_view_update: Option<Notification>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine)
            .field("editor", &self.editor)
            .field("changer", &self.changer)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        config: SessionConfig,
        parameters: SimulationParameters,
        world: DataDescription,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        parameters.validate()?;
        world.validate_ids()?;

        let ids = Arc::new(IdGenerator::new());
        if let Some(max_id) = world.max_id() {
            ids.reserve_below(max_id + 1);
        }
        let (sender, events) = create_event_bus(config.event_capacity);
        let submit = make_event_submit(sender.clone());
        let engine = LocalEngine::new(world, config.world_size, parameters.clone(), sender);
        let editor = DataEditor::new(
            Box::new(LocalDescriptionHelper::new(Arc::clone(&ids), &parameters)),
            parameters.clone(),
        );
        let changer = SimulationChanger::with_linear_calculator(config.changer.clone())?;
        let mut settings = SettingsStore::new();
        settings.set_bool_state(CHANGER_ACTIVE_STATE, false);

        info!(
            width = config.world_size.0,
            height = config.world_size.1,
            clusters = engine.world().clusters.len(),
            particles = engine.world().particles.len(),
            "session created"
        );
        Ok(Self {
            helper: LocalDescriptionHelper::new(Arc::clone(&ids), &parameters),
            history: SnapshotHistory::with_capacity(config.history_capacity),
            config,
            ids,
            editor,
            changer,
            engine,
            events,
            submit,
            settings,
            last_view_update: None,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    pub fn editor(&self) -> &DataEditor {
        &self.editor
    }

    /// Edits stay local until [`Session::flush_edits`].
    pub fn editor_mut(&mut self) -> &mut DataEditor {
        &mut self.editor
    }

    pub fn engine(&self) -> &LocalEngine {
        &self.engine
    }

    pub fn changer(&self) -> &SimulationChanger {
        &self.changer
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    pub fn parameters(&self) -> &SimulationParameters {
        self.engine.simulation_parameters()
    }

    pub fn timestep(&self) -> u64 {
        self.engine.current_timestep()
    }

    pub fn monitor_data(&self) -> MonitorData {
        self.engine.monitor_data()
    }

    /// Notification most recently addressed to the views.
    pub fn last_view_update(&self) -> Option<&Notification> {
        self.last_view_update.as_ref()
    }

    /// Whole-world region, edges included.
    pub fn world_rect(&self) -> IntRect {
        IntRect::new((0, 0), self.engine.world_size())
    }

    /// Queue a notification; it is delivered on the next [`Session::pump`].
    pub fn notify(&self, notification: Notification) -> Result<(), SessionError> {
        if (self.submit)(EngineEvent::Notify(notification)) {
            Ok(())
        } else {
            Err(SessionError::EventDropped)
        }
    }

    /// Deliver every queued event until the bus is quiet.
    pub fn pump(&mut self) -> Result<PumpReport, SessionError> {
        let mut report = PumpReport::default();
        loop {
            let events = drain_pending_events(&self.events);
            if events.is_empty() {
                return Ok(report);
            }
            for event in events {
                self.handle(event, &mut report)?;
            }
        }
    }

    fn handle(&mut self, event: EngineEvent, report: &mut PumpReport) -> Result<(), SessionError> {
        match event {
            EngineEvent::DataReadyToRetrieve => {
                let notification = self.editor.data_from_simulation_available(&mut self.engine);
                report.snapshots += 1;
                self.deliver_to_views(notification, report);
            }
            EngineEvent::MonitorDataReady => {
                report.samples += 1;
                if self.changer.on_monitor_data_available(&mut self.engine) {
                    let parameters = self.changer.parameters().clone();
                    self.apply_parameters(parameters);
                    report.parameter_changes += 1;
                }
            }
            EngineEvent::Notify(notification) => {
                if self
                    .editor
                    .send_data_changes_to_simulation(&mut self.engine, &notification.targets)?
                    .is_some()
                {
                    report.flushes += 1;
                }
                self.deliver_to_views(notification, report);
            }
        }
        Ok(())
    }

    fn deliver_to_views(&mut self, notification: Notification, report: &mut PumpReport) {
        let for_views = [
            Receiver::VisualEditor,
            Receiver::DataEditor,
            Receiver::ActionController,
            Receiver::Toolbar,
        ]
        .into_iter()
        .any(|receiver| notification.targets(receiver));
        if for_views {
            debug!(targets = ?notification.targets, update = ?notification.update, "view update");
            report.view_updates += 1;
            self.last_view_update = Some(notification);
        }
    }

    /// Ask the engine for the whole world and load it into the editor.
    pub fn refresh_editor(&mut self) -> Result<PumpReport, SessionError> {
        let rect = self.world_rect();
        self.editor
            .require_data_update_from_simulation(&mut self.engine, rect);
        self.pump()
    }

    /// Push pending editor changes to the engine.
    pub fn flush_edits(&mut self) -> Result<PumpReport, SessionError> {
        self.notify(Notification::new(
            [Receiver::Simulation, Receiver::VisualEditor],
            UpdateDescription::AllExceptToolbar,
        ))?;
        self.pump()
    }

    fn advance(&mut self) -> Result<PumpReport, SessionError> {
        self.engine.calc_single_timestep();
        self.changer.notify_next_timestep(&mut self.engine);
        self.pump()
    }

    /// One timestep that can be undone with [`Session::step_back`].
    pub fn step_forward(&mut self) -> Result<PumpReport, SessionError> {
        self.history.push(self.engine.snapshot());
        let mut report = self.advance()?;
        report.absorb(self.refresh_editor()?);
        Ok(report)
    }

    /// Undo the latest single step; `false` when there is nothing to undo.
    pub fn step_back(&mut self) -> Result<bool, SessionError> {
        let Some(snapshot) = self.history.step_back() else {
            return Ok(false);
        };
        self.engine.restore(snapshot);
        self.refresh_editor()?;
        Ok(true)
    }

    /// Run continuously; single-step history does not survive a run.
    pub fn run(&mut self, timesteps: u64) -> Result<PumpReport, SessionError> {
        self.history.clear();
        let mut report = PumpReport::default();
        for _ in 0..timesteps {
            report.absorb(self.advance()?);
        }
        report.absorb(self.refresh_editor()?);
        info!(
            timestep = self.timestep(),
            samples = report.samples,
            parameter_changes = report.parameter_changes,
            changer_state = ?self.changer.state(),
            "run finished"
        );
        Ok(report)
    }

    pub fn save_snapshot(&mut self) {
        self.history.save(self.engine.snapshot());
    }

    /// Return to the saved snapshot; `false` when none was saved.
    pub fn restore_saved(&mut self) -> Result<bool, SessionError> {
        let Some(snapshot) = self.history.saved().cloned() else {
            return Ok(false);
        };
        self.history.clear();
        self.engine.restore(snapshot);
        self.refresh_editor()?;
        Ok(true)
    }

    /// Change the world size, either tiling the content over the new world
    /// or wrapping it in and cutting connections that became too long.
    pub fn resize_world(
        &mut self,
        size: (i32, i32),
        scale_content: bool,
    ) -> Result<PumpReport, SessionError> {
        if size.0 <= 0 || size.1 <= 0 {
            return Err(ConfigError::InvalidConfig("world_size must be positive").into());
        }
        let old_size = self.engine.world_size();
        let mut world = self.engine.world().clone();
        if scale_content {
            self.helper.duplicate(&mut world, old_size, size);
        } else {
            self.helper.correct_connections(&mut world, size);
        }
        self.engine.set_world_size(size);
        self.engine.replace_world(world);
        self.config.world_size = size;
        self.history.clear();
        info!(?old_size, new_size = ?size, scale_content, "world resized");
        self.refresh_editor()
    }

    /// Running parameters as numeric knobs.
    pub fn knobs(&self) -> Result<Vec<KnobEntry>, SessionError> {
        Ok(control::list_knobs(self.parameters())?)
    }

    /// Merge a JSON patch onto the running parameters.
    pub fn apply_parameter_patch(
        &mut self,
        patch: &Value,
    ) -> Result<SimulationParameters, SessionError> {
        let parameters = control::apply_patch(self.parameters(), patch)?;
        self.override_parameters(parameters.clone())?;
        Ok(parameters)
    }

    pub fn apply_knob_updates(
        &mut self,
        updates: &[KnobUpdate],
    ) -> Result<SimulationParameters, SessionError> {
        let parameters = control::apply_updates(self.parameters(), updates)?;
        self.override_parameters(parameters.clone())?;
        Ok(parameters)
    }

    /// Parameters set by hand. An active controller restarts from them, so
    /// its next retreat cannot undo the override.
    fn override_parameters(&mut self, parameters: SimulationParameters) -> Result<(), SessionError> {
        self.apply_parameters(parameters.clone());
        if self.is_changer_active() {
            info!("controller restarted from overridden parameters");
            self.changer.activate(parameters);
        }
        self.notify(Notification::new(
            [Receiver::Toolbar, Receiver::ActionController],
            UpdateDescription::AllExceptSymbols,
        ))?;
        self.pump()?;
        Ok(())
    }

    fn apply_parameters(&mut self, parameters: SimulationParameters) {
        self.helper.set_parameters(&parameters);
        self.editor.set_parameters(parameters.clone());
        self.engine.set_simulation_parameters(parameters);
    }

    /// Let the controller take over from the current parameters.
    pub fn activate_changer(&mut self) {
        self.changer.activate(self.engine.simulation_parameters().clone());
        self.settings.set_bool_state(CHANGER_ACTIVE_STATE, true);
    }

    pub fn deactivate_changer(&mut self) {
        self.changer.deactivate();
        self.settings.set_bool_state(CHANGER_ACTIVE_STATE, false);
    }

    pub fn is_changer_active(&self) -> bool {
        self.settings.bool_state(CHANGER_ACTIVE_STATE, false)
    }
}
