//! PhotoFE core: the master/preview buffer model, the pixel engines, and the
//! worker pipeline that runs them off the UI thread.

pub mod canvas;
pub mod cli;
pub mod io;
pub mod logger;
pub mod mailbox;
pub mod ops;
pub mod raster;
pub mod settings;
pub mod worker;

pub use canvas::SharedCanvas;
pub use raster::{Raster, RasterView};
pub use settings::PipelineSettings;
pub use worker::{ToolKind, ToolRequest, ToolSupervisor, WorkerEvent, WorkerState};
