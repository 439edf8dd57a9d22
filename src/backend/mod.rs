pub mod hyprland;
pub mod toplevels;
pub mod wlr;

use crate::{
    config::{BackendChoice, Config},
    registry::{RegistryError, WindowRegistry},
};
use thiserror::Error;
use wayland_client::{Connection, DispatchError};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("hyprland ipc: {0}")]
    Ipc(#[from] ::hyprland::error::HyprError),

    #[error("wayland dispatch: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("wayland connection: {0}")]
    Connection(#[from] wayland_client::backend::WaylandError),

    #[error("compositor does not advertise {0}")]
    MissingGlobal(&'static str),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Source of window data for the switcher.
///
/// Exactly one implementation is selected at startup and kept for the whole
/// process lifetime.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Appends the current windows, most recently used first.
    fn enumerate_windows(
        &mut self,
        registry: &mut WindowRegistry,
        config: &Config,
    ) -> Result<(), BackendError>;

    /// Focuses the window with `identifier`. Failures are logged, never surfaced.
    fn activate_window(&mut self, identifier: &str);

    /// Drains events queued for the backend's own protocol objects.
    fn dispatch_pending(&mut self) -> Result<usize, BackendError> {
        Ok(0)
    }

    /// Returns whether the window list changed since the last call.
    fn take_needs_refresh(&mut self) -> bool {
        false
    }
}

pub fn init(choice: BackendChoice, connection: &Connection) -> Result<Box<dyn Backend>, BackendError> {
    let choice = match choice {
        BackendChoice::Auto if hyprland::is_available() => BackendChoice::Hyprland,
        BackendChoice::Auto => BackendChoice::Wlr,
        other => other,
    };

    let backend: Box<dyn Backend> = match choice {
        BackendChoice::Hyprland => Box::new(hyprland::HyprlandBackend),
        _ => Box::new(wlr::WlrBackend::new(connection.clone())?),
    };
    log::info!("Using {} backend", backend.name());

    Ok(backend)
}
