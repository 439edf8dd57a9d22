mod panel;

pub use panel::Panel;

use crate::{
    backend::Backend,
    config::Config,
    ipc::Command,
    registry::WindowRegistry,
    switcher::{Context, Flow, Overlay, Switcher},
};
use anyhow::{Context as _, bail};
use log::{debug, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_keyboard, delegate_layer, delegate_output, delegate_registry,
    delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        Capability, SeatHandler, SeatState,
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers},
    },
    shell::wlr_layer::{LayerShell, LayerShellHandler, LayerSurface, LayerSurfaceConfigure},
    shm::{Shm, ShmHandler},
};
use std::{thread, time::Duration};
use wayland_client::{
    Connection, EventQueue, Proxy, QueueHandle,
    globals::{Global, GlobalList, registry_queue_init},
    protocol::{wl_keyboard::WlKeyboard, wl_output, wl_seat::WlSeat, wl_surface::WlSurface},
};

const CONNECT_ATTEMPTS: u32 = 25;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

const GLOBAL_ATTEMPTS: u32 = 50;
const GLOBAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const REQUIRED_GLOBALS: [&str; 3] = ["wl_compositor", "wl_shm", "zwlr_layer_shell_v1"];

/// Connects to the compositor, waiting for its socket to show up.
pub fn connect() -> anyhow::Result<Connection> {
    let mut attempt = 1;
    loop {
        match Connection::connect_to_env() {
            Ok(connection) => return Ok(connection),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                debug!("Wayland connection attempt {attempt} failed: {e}");
                attempt += 1;
                thread::sleep(CONNECT_RETRY_DELAY);
            }
            Err(e) => {
                return Err(e).context(format!(
                    "failed to connect to Wayland after {CONNECT_ATTEMPTS} attempts"
                ));
            }
        }
    }
}

fn missing_globals(globals: &[Global]) -> Vec<&'static str> {
    REQUIRED_GLOBALS
        .into_iter()
        .filter(|interface| !globals.iter().any(|g| g.interface == *interface))
        .collect()
}

/// Lists the globals until the overlay's interfaces are all advertised.
///
/// A compositor that is still starting up may not have announced them yet.
fn wait_for_globals(connection: &Connection) -> anyhow::Result<(GlobalList, EventQueue<Daemon>)> {
    let mut attempt = 1;
    loop {
        let (globals, event_queue) =
            registry_queue_init::<Daemon>(connection).context("failed to list globals")?;
        let missing = missing_globals(&globals.contents().clone_list());
        if missing.is_empty() {
            return Ok((globals, event_queue));
        }
        if attempt >= GLOBAL_ATTEMPTS {
            bail!(
                "compositor does not provide {} after {GLOBAL_ATTEMPTS} attempts",
                missing.join(", ")
            );
        }
        debug!("Waiting for globals: {}", missing.join(", "));
        attempt += 1;
        thread::sleep(GLOBAL_RETRY_DELAY);
    }
}

/// Everything the daemon's main event queue dispatches into.
pub struct Daemon {
    pub config: Config,
    pub registry: WindowRegistry,
    pub switcher: Switcher,
    pub backend: Box<dyn Backend>,
    pub panel: Panel,
    registry_state: RegistryState,
    seat_state: SeatState,
    output_state: OutputState,
    keyboard: Option<WlKeyboard>,
}

impl Daemon {
    /// Binds the overlay globals on a fresh queue and creates the panel.
    pub fn new(
        connection: &Connection,
        config: Config,
        backend: Box<dyn Backend>,
    ) -> anyhow::Result<(EventQueue<Self>, Self)> {
        let (globals, mut event_queue) = wait_for_globals(connection)?;
        let handle = event_queue.handle();

        let compositor =
            CompositorState::bind(&globals, &handle).context("wl_compositor not available")?;
        let layer_shell =
            LayerShell::bind(&globals, &handle).context("zwlr_layer_shell_v1 not available")?;
        let shm = Shm::bind(&globals, &handle).context("wl_shm not available")?;
        if !globals
            .contents()
            .with_list(|list| list.iter().any(|g| g.interface == "wl_seat"))
        {
            warn!("No seat available, keyboard input disabled");
        }

        let mut panel = Panel::new(compositor, layer_shell, shm, handle.clone(), &config)?;
        panel.create()?;

        let mut daemon = Self {
            config,
            registry: WindowRegistry::default(),
            switcher: Switcher::default(),
            backend,
            panel,
            registry_state: RegistryState::new(&globals),
            seat_state: SeatState::new(&globals, &handle),
            output_state: OutputState::new(&globals, &handle),
            keyboard: None,
        };
        event_queue
            .roundtrip(&mut daemon)
            .context("initial roundtrip failed")?;
        info!("Overlay ready");

        Ok((event_queue, daemon))
    }

    /// Splits the switcher from the parts it operates on.
    fn context(&mut self) -> (&mut Switcher, Context<'_>) {
        (
            &mut self.switcher,
            Context {
                registry: &mut self.registry,
                backend: self.backend.as_mut(),
                overlay: &mut self.panel,
                config: &self.config,
            },
        )
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        let (switcher, mut cx) = self.context();
        switcher.handle_command(command, &mut cx)
    }

    pub fn refresh_if_stale(&mut self) {
        let (switcher, mut cx) = self.context();
        switcher.refresh_if_stale(&mut cx);
    }

    fn key_command(&mut self, command: Option<Command>) {
        if let Some(command) = command
            && self.switcher.is_visible()
        {
            debug!("Keyboard command: {}", command.to_wire());
            self.handle_command(command);
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.panel.destroy();
        if let Some(keyboard) = self.keyboard.take()
            && keyboard.version() >= 3
        {
            keyboard.release();
        }
    }
}

impl CompositorHandler for Daemon {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for Daemon {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        if let Some(name) = self.output_state.info(&output).and_then(|info| info.name) {
            debug!("Output added: {name}");
        }
    }

    fn update_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}

    fn output_destroyed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: wl_output::WlOutput) {}
}

impl LayerShellHandler for Daemon {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if !self.panel.is_layer(layer) {
            return;
        }
        warn!("Layer surface closed by compositor");
        self.panel.destroy();
        self.switcher.overlay_lost();
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        // Events for a surface destroyed on hide can still be in flight.
        if !self.panel.is_layer(layer) {
            return;
        }

        let (width, height) = configure.new_size;
        if width > 0 && height > 0 {
            self.registry.width = width;
            self.registry.height = height;
        }
        self.panel.mark_configured();
        if self.switcher.is_visible() {
            self.panel.render(&self.registry);
        }
    }
}

impl SeatHandler for Daemon {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Keyboard && self.keyboard.is_none() {
            match self.seat_state.get_keyboard(qh, &seat, None) {
                Ok(keyboard) => {
                    self.keyboard = Some(keyboard);
                    debug!("Keyboard listener attached");
                }
                Err(e) => warn!("Failed to get keyboard: {e}"),
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Keyboard
            && let Some(keyboard) = self.keyboard.take()
        {
            if keyboard.version() >= 3 {
                keyboard.release();
            }
            debug!("Keyboard removed from seat");
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: WlSeat) {}
}

impl KeyboardHandler for Daemon {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &WlKeyboard,
        _surface: &WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &WlKeyboard,
        _surface: &WlSurface,
        _serial: u32,
    ) {
        self.panel.keyboard.reset();
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        let command = self.panel.keyboard.key(event.keysym);
        self.key_command(command);
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &WlKeyboard,
        _serial: u32,
        _event: KeyEvent,
    ) {
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &WlKeyboard,
        _serial: u32,
        modifiers: Modifiers,
        _layout: u32,
    ) {
        let command = self.panel.keyboard.modifiers(modifiers);
        self.key_command(command);
    }
}

impl ShmHandler for Daemon {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.panel.shm
    }
}

impl ProvidesRegistryState for Daemon {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

delegate_compositor!(Daemon);
delegate_output!(Daemon);
delegate_shm!(Daemon);
delegate_seat!(Daemon);
delegate_keyboard!(Daemon);
delegate_layer!(Daemon);
delegate_registry!(Daemon);

#[cfg(test)]
mod tests {
    use super::*;

    fn global(name: u32, interface: &str) -> Global {
        Global {
            name,
            interface: interface.to_string(),
            version: 1,
        }
    }

    #[test]
    fn reports_missing_overlay_globals() {
        assert_eq!(missing_globals(&[]), REQUIRED_GLOBALS.to_vec());
        assert_eq!(
            missing_globals(&[global(1, "wl_compositor"), global(2, "wl_seat")]),
            vec!["wl_shm", "zwlr_layer_shell_v1"]
        );
    }

    #[test]
    fn complete_global_list_needs_no_retry() {
        let globals = [
            global(3, "zwlr_layer_shell_v1"),
            global(1, "wl_compositor"),
            global(7, "wl_output"),
            global(2, "wl_shm"),
        ];
        assert!(missing_globals(&globals).is_empty());
    }
}
