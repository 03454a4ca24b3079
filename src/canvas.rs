// ============================================================================
// CANVAS STATE — master / preview rasters behind one shared lock
// ============================================================================
//
// `master` is the last committed image, `preview` the scratch result of the
// tool currently being edited. Both live in `CanvasBuffers`, and every read or
// write goes through the single mutex held by `SharedCanvas`. Workers receive
// a clone of the handle at construction and are rebound explicitly when the
// canvas is replaced.
// ============================================================================

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use crate::ops::{EngineError, EngineStatus};
use crate::raster::Raster;

/// The two long-lived rasters. Either may be unset (no image loaded).
#[derive(Debug, Default)]
pub struct CanvasBuffers {
    master: Option<Raster>,
    preview: Option<Raster>,
    /// Bumped on every attach / clear / commit, so results computed from an
    /// older master can be recognised and dropped.
    epoch: u64,
}

impl CanvasBuffers {
    pub fn master(&self) -> Option<&Raster> {
        self.master.as_ref()
    }

    pub fn preview(&self) -> Option<&Raster> {
        self.preview.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Both buffers are set.
    pub fn is_attached(&self) -> bool {
        self.master.is_some() && self.preview.is_some()
    }

    /// Install a freshly loaded image as both master and preview.
    pub fn attach(&mut self, raster: Raster) {
        self.preview = Some(raster.clone());
        self.master = Some(raster);
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Drop both buffers (image closed or failed to load).
    pub fn clear(&mut self) {
        self.master = None;
        self.preview = None;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Deep-copy preview into master. Returns `false` when nothing is attached.
    pub fn commit(&mut self) -> bool {
        match (&self.preview, self.master.is_some()) {
            (Some(preview), true) => {
                self.master = Some(preview.clone());
                self.epoch = self.epoch.wrapping_add(1);
                true
            }
            _ => false,
        }
    }

    /// Restore preview from master, discarding the in-progress edit.
    pub fn revert(&mut self) -> bool {
        match &self.master {
            Some(master) => {
                self.preview = Some(master.clone());
                true
            }
            None => false,
        }
    }

    /// Master and preview agree on width, height and channel count.
    pub fn shapes_match(&self) -> bool {
        match (&self.master, &self.preview) {
            (Some(m), Some(p)) => m.same_shape(p),
            _ => true,
        }
    }
}

/// Cloneable handle to the shared canvas.
#[derive(Clone, Debug, Default)]
pub struct SharedCanvas {
    inner: Arc<Mutex<CanvasBuffers>>,
}

impl SharedCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when both handles refer to the same buffers.
    pub fn ptr_eq(&self, other: &SharedCanvas) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Blocking lock. Used by workers; a poisoned lock is recovered since the
    /// buffers are always left in a consistent state between statements.
    pub fn lock(&self) -> MutexGuard<'_, CanvasBuffers> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::error!("canvas lock poisoned by a panicking thread; recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Non-blocking attempt.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, CanvasBuffers>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => {
                log::error!("canvas lock poisoned by a panicking thread; recovering");
                Some(poisoned.into_inner())
            }
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Lock for the UI / coordinator thread: never parks on the mutex, but
    /// polls, calling `pump` between attempts so the caller's event loop keeps
    /// running.
    pub fn lock_polling<F: FnMut()>(&self, interval: Duration, mut pump: F) -> MutexGuard<'_, CanvasBuffers> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            pump();
            std::thread::sleep(interval);
        }
    }

    /// Run `engine` on a snapshot of master and install the result as the new
    /// preview.
    ///
    /// The master is copied under the lock and processed with the lock
    /// released. The result is only installed when the master is unchanged
    /// (same epoch) and `is_current` still holds, both checked under the lock.
    /// With `preserve_shape` the result must have the master's shape; anything
    /// else is an invariant violation.
    pub fn render_preview_with<C, F>(
        &self,
        preserve_shape: bool,
        is_current: C,
        engine: F,
    ) -> Result<EngineStatus, EngineError>
    where
        C: Fn() -> bool,
        F: FnOnce(&Raster) -> Result<Raster, EngineError>,
    {
        let (master, epoch) = {
            let buffers = self.lock();
            if !buffers.is_attached() {
                return Ok(EngineStatus::NotAttached);
            }
            if preserve_shape && !buffers.shapes_match() {
                return Err(shape_violation("master and preview differ before processing"));
            }
            match buffers.master() {
                Some(m) => (m.clone(), buffers.epoch()),
                None => return Ok(EngineStatus::NotAttached),
            }
        };

        let result = engine(&master)?;
        if preserve_shape && !result.same_shape(&master) {
            return Err(shape_violation("engine changed the raster shape"));
        }

        let mut buffers = self.lock();
        if !buffers.is_attached() {
            return Ok(EngineStatus::NotAttached);
        }
        if buffers.epoch() != epoch || !is_current() {
            return Ok(EngineStatus::Stale);
        }
        buffers.preview = Some(result);
        Ok(EngineStatus::Done)
    }

    /// `render_preview_with` without a staleness predicate.
    pub fn render_preview<F>(&self, preserve_shape: bool, engine: F) -> Result<EngineStatus, EngineError>
    where
        F: FnOnce(&Raster) -> Result<Raster, EngineError>,
    {
        self.render_preview_with(preserve_shape, || true, engine)
    }

    /// Copy of the current preview, if any.
    pub fn preview_snapshot(&self) -> Option<Raster> {
        self.lock().preview().cloned()
    }

    /// Copy of the current master, if any.
    pub fn master_snapshot(&self) -> Option<Raster> {
        self.lock().master().cloned()
    }
}

fn shape_violation(what: &str) -> EngineError {
    log::error!("buffer invariant violated: {}", what);
    debug_assert!(false, "buffer invariant violated: {}", what);
    EngineError::Invariant(what.to_string())
}
