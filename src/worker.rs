// ============================================================================
// TOOL WORKERS — one background thread per visible tool, plus the supervisor
// ============================================================================
//
// Each tool category (adjust, filter, transform) owns a slot. Showing a tool
// starts a named worker thread that blocks on the tool's mailbox, runs the
// engine against a snapshot of master, and installs the preview. Hiding or
// cancelling closes the mailbox and retires the thread; a new worker for the
// same slot is only spawned once the retiring one has exited.
//
// Every slot carries a generation counter. Apply, cancel, hide and rebind bump
// it; a worker only installs a result when the generation it captured at
// `take()` is still current.
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::canvas::SharedCanvas;
use crate::mailbox::Mailbox;
use crate::ops::adjustments::{AdjustEngine, AdjustParams};
use crate::ops::filters::{FilterEngine, FilterParams};
use crate::ops::transform::{TransformEngine, TransformRequest};
use crate::ops::{EngineError, EngineStatus};
use crate::raster::Raster;
use crate::settings::PipelineSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Adjust,
    Filter,
    Transform,
}

impl ToolKind {
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Adjust => "adjust",
            ToolKind::Filter => "filter",
            ToolKind::Transform => "transform",
        }
    }

    pub fn all() -> &'static [ToolKind] {
        &[ToolKind::Adjust, ToolKind::Filter, ToolKind::Transform]
    }

    /// Adjust and filter keep the master's shape; transforms may not.
    pub fn preserves_shape(&self) -> bool {
        !matches!(self, ToolKind::Transform)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Advisory messages from workers to the UI. Not used for synchronisation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    Status { tool: ToolKind, text: String },
    PreviewReady { tool: ToolKind },
    Warning { tool: ToolKind, message: String },
}

/// A pixel engine run by a tool worker.
pub trait ToolEngine: Send + 'static {
    type Params: Send + Clone + Default + 'static;
    const KIND: ToolKind;

    fn process(&self, master: &Raster, params: &Self::Params) -> Result<Raster, EngineError>;
}

/// Parameters published by the UI, routed to the matching tool.
#[derive(Clone, Debug)]
pub enum ToolRequest {
    Adjust(AdjustParams),
    Filter(FilterParams),
    Transform(TransformRequest),
}

impl ToolRequest {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolRequest::Adjust(_) => ToolKind::Adjust,
            ToolRequest::Filter(_) => ToolKind::Filter,
            ToolRequest::Transform(_) => ToolKind::Transform,
        }
    }
}

enum Control {
    Rebind(SharedCanvas),
}

// ============================================================================
// WORKER LOOP
// ============================================================================

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn run_worker<E: ToolEngine>(
    engine: E,
    mut canvas: SharedCanvas,
    mailbox: Arc<Mailbox<E::Params>>,
    control: Receiver<Control>,
    generation: Arc<AtomicU64>,
    events: Sender<WorkerEvent>,
) {
    let tool = E::KIND;
    log::debug!("{} worker started", tool.label());

    while let Some(params) = mailbox.wait_take() {
        while let Ok(Control::Rebind(next)) = control.try_recv() {
            log::debug!("{} worker rebound to new buffers", tool.label());
            canvas = next;
        }
        let token = generation.load(Ordering::Acquire);

        let _ = events.send(WorkerEvent::Status { tool, text: "Working...".to_string() });
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            canvas.render_preview_with(
                tool.preserves_shape(),
                || generation.load(Ordering::Acquire) == token,
                |master| engine.process(master, &params),
            )
        }));

        let mut status = String::new();
        match outcome {
            Ok(Ok(EngineStatus::Done)) => {
                let _ = events.send(WorkerEvent::PreviewReady { tool });
            }
            Ok(Ok(EngineStatus::Stale)) => {
                log::debug!("{} result superseded, dropped", tool.label());
            }
            Ok(Ok(EngineStatus::NotAttached)) => {
                status = EngineStatus::NotAttached.message().to_string();
            }
            Ok(Err(e)) => {
                log::warn!("{} engine failed: {}", tool.label(), e);
                let _ = events.send(WorkerEvent::Warning { tool, message: e.to_string() });
            }
            Err(payload) => {
                let e = EngineError::Panicked(panic_message(payload.as_ref()));
                log::error!("{} engine: {}", tool.label(), e);
                let _ = events.send(WorkerEvent::Warning { tool, message: e.to_string() });
            }
        }
        let _ = events.send(WorkerEvent::Status { tool, text: status });
    }

    log::debug!("{} worker exiting", tool.label());
}

// ============================================================================
// TOOL SLOT
// ============================================================================

struct WorkerHandle<P> {
    mailbox: Arc<Mailbox<P>>,
    control: Sender<Control>,
    thread: JoinHandle<()>,
}

/// Lifecycle of one tool category: at most one live worker at a time.
struct ToolSlot<E: ToolEngine + Clone> {
    engine: E,
    state: WorkerState,
    generation: Arc<AtomicU64>,
    active: Option<WorkerHandle<E::Params>>,
    retiring: Option<JoinHandle<()>>,
}

impl<E: ToolEngine + Clone> ToolSlot<E> {
    fn new(engine: E) -> Self {
        Self {
            engine,
            state: WorkerState::Stopped,
            generation: Arc::new(AtomicU64::new(1)),
            active: None,
            retiring: None,
        }
    }

    fn publish(&self, params: E::Params) -> bool {
        match &self.active {
            Some(handle) => {
                handle.mailbox.publish(params);
                true
            }
            None => {
                log::warn!("{} parameters published while the tool is not running", E::KIND.label());
                false
            }
        }
    }
}

/// Type-erased slot operations used by the supervisor.
trait Slot {
    fn kind(&self) -> ToolKind;
    fn state(&mut self) -> WorkerState;
    fn start(
        &mut self,
        canvas: &SharedCanvas,
        events: &Sender<WorkerEvent>,
        poll: Duration,
        pump: &mut dyn FnMut(),
    ) -> std::io::Result<()>;
    fn stop(&mut self);
    fn wait_retired(&mut self, poll: Duration, pump: &mut dyn FnMut());
    fn join(&mut self);
    fn bump_generation(&self);
    fn discard_pending(&self);
    fn rebind(&self, canvas: &SharedCanvas);
    fn is_running(&self) -> bool;
}

impl<E: ToolEngine + Clone> Slot for ToolSlot<E> {
    fn kind(&self) -> ToolKind {
        E::KIND
    }

    fn state(&mut self) -> WorkerState {
        if self.state == WorkerState::Stopping && self.retiring.as_ref().is_none_or(|h| h.is_finished()) {
            self.state = WorkerState::Stopped;
        }
        self.state
    }

    fn start(
        &mut self,
        canvas: &SharedCanvas,
        events: &Sender<WorkerEvent>,
        poll: Duration,
        pump: &mut dyn FnMut(),
    ) -> std::io::Result<()> {
        if self.active.is_some() {
            return Ok(());
        }
        self.state = WorkerState::Starting;
        self.wait_retired(poll, pump);

        let mailbox = Arc::new(Mailbox::new());
        let (control_tx, control_rx) = mpsc::channel();
        let engine = self.engine.clone();
        let worker_canvas = canvas.clone();
        let worker_mailbox = Arc::clone(&mailbox);
        let generation = Arc::clone(&self.generation);
        let worker_events = events.clone();

        let spawned = thread::Builder::new()
            .name(format!("photofe-{}", E::KIND.label()))
            .spawn(move || run_worker(engine, worker_canvas, worker_mailbox, control_rx, generation, worker_events));

        match spawned {
            Ok(thread) => {
                self.active = Some(WorkerHandle { mailbox, control: control_tx, thread });
                self.state = WorkerState::Running;
                log::info!("{} tool started", E::KIND.label());
                Ok(())
            }
            Err(e) => {
                log::error!("failed to spawn {} worker: {}", E::KIND.label(), e);
                self.state = WorkerState::Stopped;
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        self.bump_generation();
        let Some(handle) = self.active.take() else {
            return;
        };
        self.state = WorkerState::Stopping;
        handle.mailbox.close();
        drop(handle.control);
        // A previous retiree can only be left here if start() was skipped;
        // join it rather than lose the handle.
        if let Some(old) = self.retiring.replace(handle.thread) {
            if old.join().is_err() {
                log::error!("{} worker panicked while exiting", E::KIND.label());
            }
        }
        log::info!("{} tool stopping", E::KIND.label());
    }

    fn wait_retired(&mut self, poll: Duration, pump: &mut dyn FnMut()) {
        while let Some(handle) = self.retiring.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::error!("{} worker panicked while exiting", E::KIND.label());
                }
                break;
            }
            self.retiring = Some(handle);
            pump();
            thread::sleep(poll);
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.retiring.take() {
            if handle.join().is_err() {
                log::error!("{} worker panicked while exiting", E::KIND.label());
            }
        }
        if self.state == WorkerState::Stopping {
            self.state = WorkerState::Stopped;
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn discard_pending(&self) {
        if let Some(handle) = &self.active {
            handle.mailbox.discard();
        }
    }

    fn rebind(&self, canvas: &SharedCanvas) {
        if let Some(handle) = &self.active {
            let _ = handle.control.send(Control::Rebind(canvas.clone()));
        }
        self.bump_generation();
    }

    fn is_running(&self) -> bool {
        self.active.is_some()
    }
}

// ============================================================================
// SUPERVISOR
// ============================================================================

/// Owns the three tool slots and the shared canvas handle. Lives on the
/// UI / coordinator thread; every method that needs the canvas lock polls it
/// and calls `pump` between attempts.
pub struct ToolSupervisor {
    canvas: SharedCanvas,
    settings: PipelineSettings,
    events: Sender<WorkerEvent>,
    adjust: ToolSlot<AdjustEngine>,
    filter: ToolSlot<FilterEngine>,
    transform: ToolSlot<TransformEngine>,
}

impl ToolSupervisor {
    pub fn new(canvas: SharedCanvas, settings: PipelineSettings) -> (Self, Receiver<WorkerEvent>) {
        let (events, rx) = mpsc::channel();
        let supervisor = Self {
            canvas,
            adjust: ToolSlot::new(AdjustEngine),
            filter: ToolSlot::new(FilterEngine { settings: settings.clone() }),
            transform: ToolSlot::new(TransformEngine { interpolation: settings.interpolation }),
            settings,
            events,
        };
        (supervisor, rx)
    }

    pub fn canvas(&self) -> &SharedCanvas {
        &self.canvas
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn slot_mut(&mut self, kind: ToolKind) -> &mut dyn Slot {
        match kind {
            ToolKind::Adjust => &mut self.adjust,
            ToolKind::Filter => &mut self.filter,
            ToolKind::Transform => &mut self.transform,
        }
    }

    fn slots_mut(&mut self) -> [&mut dyn Slot; 3] {
        [&mut self.adjust, &mut self.filter, &mut self.transform]
    }

    pub fn state(&mut self, kind: ToolKind) -> WorkerState {
        self.slot_mut(kind).state()
    }

    /// Tool menu became visible. Any other visible tool is hidden first, so
    /// at most one tool edits the preview at a time.
    pub fn show(&mut self, kind: ToolKind, mut pump: impl FnMut()) -> std::io::Result<()> {
        let others: Vec<ToolKind> = ToolKind::all()
            .iter()
            .copied()
            .filter(|&k| k != kind && self.slot_mut(k).is_running())
            .collect();
        for other in others {
            self.hide(other, &mut pump);
        }
        let canvas = self.canvas.clone();
        let events = self.events.clone();
        let poll = self.settings.shutdown_poll;
        self.slot_mut(kind).start(&canvas, &events, poll, &mut pump)
    }

    /// Tool menu hidden: revert the preview and retire the worker.
    pub fn hide(&mut self, kind: ToolKind, mut pump: impl FnMut()) {
        let was_running = self.slot_mut(kind).is_running();
        self.slot_mut(kind).stop();
        if was_running {
            self.canvas.lock_polling(self.settings.lock_poll, &mut pump).revert();
        }
    }

    /// Cancel button: same as hiding, nothing of the edit survives.
    pub fn cancel(&mut self, kind: ToolKind, pump: impl FnMut()) {
        log::info!("{} cancelled", kind.label());
        self.hide(kind, pump);
    }

    /// Apply button: commit preview into master. Pending and in-flight
    /// parameter sets are dropped. Returns `false` when nothing is attached.
    pub fn apply(&mut self, kind: ToolKind, mut pump: impl FnMut()) -> bool {
        let slot = self.slot_mut(kind);
        slot.bump_generation();
        slot.discard_pending();
        let committed = self.canvas.lock_polling(self.settings.lock_poll, &mut pump).commit();
        if committed {
            log::info!("{} applied", kind.label());
        }
        committed
    }

    /// Route a parameter set to its tool. Returns `false` when that tool is
    /// not running.
    pub fn publish(&mut self, request: ToolRequest) -> bool {
        match request {
            ToolRequest::Adjust(p) => self.adjust.publish(p),
            ToolRequest::Filter(p) => self.filter.publish(p),
            ToolRequest::Transform(p) => self.transform.publish(p),
        }
    }

    /// Point every worker at a different canvas.
    pub fn rebind(&mut self, canvas: SharedCanvas) {
        for slot in self.slots_mut() {
            slot.rebind(&canvas);
        }
        self.canvas = canvas;
    }

    /// The buffers behind the current canvas were replaced (load or clear).
    /// Results computed from the old image are dropped.
    pub fn notify_buffers_changed(&mut self) {
        for slot in self.slots_mut() {
            slot.bump_generation();
        }
    }

    /// Install a freshly loaded image as master and preview.
    pub fn attach_image(&mut self, raster: Raster, mut pump: impl FnMut()) {
        self.canvas.lock_polling(self.settings.lock_poll, &mut pump).attach(raster);
        self.notify_buffers_changed();
    }

    /// Drop both buffers.
    pub fn clear_image(&mut self, mut pump: impl FnMut()) {
        self.canvas.lock_polling(self.settings.lock_poll, &mut pump).clear();
        self.notify_buffers_changed();
    }

    /// Stop every worker and wait for all of them to exit.
    pub fn shutdown(&mut self) {
        for slot in self.slots_mut() {
            let was_running = slot.is_running();
            slot.stop();
            slot.join();
            if was_running {
                log::debug!("{} worker joined", slot.kind().label());
            }
        }
    }
}

impl Drop for ToolSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
