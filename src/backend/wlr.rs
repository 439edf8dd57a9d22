use super::{
    Backend, BackendError,
    toplevels::{Activation, Toplevels},
};
use crate::{config::Config, registry::WindowRegistry};
use log::{debug, info, warn};
use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle,
    backend::ObjectId,
    protocol::{
        wl_registry::{self, WlRegistry},
        wl_seat::WlSeat,
    },
};
use wayland_protocols_wlr::foreign_toplevel::v1::client::{
    zwlr_foreign_toplevel_handle_v1::{self, ZwlrForeignToplevelHandleV1},
    zwlr_foreign_toplevel_manager_v1::{self, ZwlrForeignToplevelManagerV1},
};

const MANAGER_VERSION: u32 = 3;
const SEAT_VERSION: u32 = 1;

/// Window source backed by `zwlr_foreign_toplevel_manager_v1`.
///
/// Owns a private event queue on the daemon's connection; its toplevel list is
/// only touched while that queue is being dispatched.
pub struct WlrBackend {
    connection: Connection,
    event_queue: EventQueue<WlrState>,
    _registry: WlRegistry,
    state: WlrState,
}

#[derive(Default)]
struct WlrState {
    manager: Option<ZwlrForeignToplevelManagerV1>,
    seat: Option<WlSeat>,
    toplevels: Toplevels<ObjectId, ZwlrForeignToplevelHandleV1>,
}

impl WlrBackend {
    pub fn new(connection: Connection) -> Result<Self, BackendError> {
        info!("Initializing wlr foreign toplevel backend");

        let mut event_queue = connection.new_event_queue();
        let handle = event_queue.handle();
        let registry = connection.display().get_registry(&handle, ());
        let mut state = WlrState::default();

        debug!("First roundtrip to discover globals");
        event_queue.roundtrip(&mut state)?;

        if state.manager.is_none() {
            return Err(BackendError::MissingGlobal(
                ZwlrForeignToplevelManagerV1::interface().name,
            ));
        }
        if state.seat.is_none() {
            warn!("No seat advertised, window activation will only reorder locally");
        }

        debug!("Second roundtrip to receive the initial toplevels");
        event_queue.roundtrip(&mut state)?;
        state.toplevels.clear_needs_refresh();

        info!(
            "wlr backend initialized with {} windows ({} active)",
            state.toplevels.len(),
            state.toplevels.active_count()
        );

        Ok(Self {
            connection,
            event_queue,
            _registry: registry,
            state,
        })
    }
}

impl Backend for WlrBackend {
    fn name(&self) -> &'static str {
        "wlr"
    }

    fn enumerate_windows(
        &mut self,
        registry: &mut WindowRegistry,
        _config: &Config,
    ) -> Result<(), BackendError> {
        self.event_queue.dispatch_pending(&mut self.state)?;
        self.connection.flush()?;

        self.state.toplevels.collect_into(registry)?;
        if registry.is_empty() {
            debug!("No windows found");
        }
        Ok(())
    }

    fn activate_window(&mut self, identifier: &str) {
        let seat = self.state.seat.clone();
        match self.state.toplevels.activate(identifier) {
            Activation::NotFound => warn!("Window not found: {identifier}"),
            Activation::Found { handle, title } => match seat {
                Some(seat) => {
                    info!("Activating window via wlr protocol: {title}");
                    handle.activate(&seat);
                    if let Err(e) = self.connection.flush() {
                        warn!("Failed to flush activation request: {e}");
                    }
                }
                None => warn!("No seat available, {title} was only moved to the front"),
            },
        }
    }

    fn dispatch_pending(&mut self) -> Result<usize, BackendError> {
        Ok(self.event_queue.dispatch_pending(&mut self.state)?)
    }

    fn take_needs_refresh(&mut self) -> bool {
        self.state.toplevels.take_needs_refresh()
    }
}

impl Drop for WlrBackend {
    fn drop(&mut self) {
        debug!("Cleaning up wlr backend");
        for handle in self.state.toplevels.drain() {
            handle.destroy();
        }
        if let Some(manager) = self.state.manager.take() {
            manager.stop();
        }
        let _ = self.connection.flush();
    }
}

impl Dispatch<WlRegistry, ()> for WlrState {
    fn event(
        state: &mut Self,
        proxy: &WlRegistry,
        event: <WlRegistry as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        handle: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if interface == ZwlrForeignToplevelManagerV1::interface().name
                    && state.manager.is_none()
                {
                    debug!("Binding foreign toplevel manager (name {name}, version {version})");
                    state.manager =
                        Some(proxy.bind(name, version.min(MANAGER_VERSION), handle, ()));
                } else if interface == WlSeat::interface().name && state.seat.is_none() {
                    debug!("Binding seat (name {name}, version {version})");
                    state.seat = Some(proxy.bind(name, version.min(SEAT_VERSION), handle, ()));
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                debug!("Registry global removed: {name}");
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for WlrState {
    fn event(
        _state: &mut Self,
        _proxy: &WlSeat,
        _event: <WlSeat as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ZwlrForeignToplevelManagerV1, ()> for WlrState {
    fn event(
        state: &mut Self,
        _proxy: &ZwlrForeignToplevelManagerV1,
        event: zwlr_foreign_toplevel_manager_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            zwlr_foreign_toplevel_manager_v1::Event::Toplevel { toplevel } => {
                state.toplevels.appeared(toplevel.id(), toplevel);
            }
            zwlr_foreign_toplevel_manager_v1::Event::Finished => {
                warn!("Foreign toplevel manager finished");
                state.manager = None;
            }
            _ => {}
        }
    }

    wayland_client::event_created_child!(WlrState, ZwlrForeignToplevelManagerV1, [
        zwlr_foreign_toplevel_manager_v1::EVT_TOPLEVEL_OPCODE => (ZwlrForeignToplevelHandleV1, ())
    ]);
}

impl Dispatch<ZwlrForeignToplevelHandleV1, ()> for WlrState {
    fn event(
        state: &mut Self,
        proxy: &ZwlrForeignToplevelHandleV1,
        event: zwlr_foreign_toplevel_handle_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        let id = proxy.id();
        match event {
            zwlr_foreign_toplevel_handle_v1::Event::Title { title } => {
                state.toplevels.set_title(&id, title);
            }
            zwlr_foreign_toplevel_handle_v1::Event::AppId { app_id } => {
                state.toplevels.set_app_id(&id, app_id);
            }
            zwlr_foreign_toplevel_handle_v1::Event::State { state: raw } => {
                state.toplevels.set_state(&id, &decode_states(&raw));
            }
            zwlr_foreign_toplevel_handle_v1::Event::Done => {
                state.toplevels.done();
            }
            zwlr_foreign_toplevel_handle_v1::Event::Closed => {
                if let Some(handle) = state.toplevels.closed(&id) {
                    handle.destroy();
                }
            }
            _ => {}
        }
    }
}

/// Decodes a `wl_array` of native-endian `u32` state values.
fn decode_states(raw: &[u8]) -> Vec<u32> {
    raw.chunks_exact(4)
        .filter_map(|chunk| chunk.try_into().ok().map(u32::from_ne_bytes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::toplevels::{STATE_ACTIVATED, STATE_MINIMIZED};
    use zwlr_foreign_toplevel_handle_v1::State;

    #[test]
    fn state_constants_match_protocol() {
        assert_eq!(State::Activated as u32, STATE_ACTIVATED);
        assert_eq!(State::Minimized as u32, STATE_MINIMIZED);
    }

    #[test]
    fn decodes_native_endian_state_array() {
        let raw: Vec<u8> = [STATE_ACTIVATED, 0, STATE_MINIMIZED]
            .iter()
            .flat_map(|s| s.to_ne_bytes())
            .collect();
        assert_eq!(decode_states(&raw), vec![2, 0, 1]);
    }

    #[test]
    fn ignores_trailing_partial_state() {
        let mut raw = 3u32.to_ne_bytes().to_vec();
        raw.push(0xff);
        assert_eq!(decode_states(&raw), vec![3]);
    }
}
