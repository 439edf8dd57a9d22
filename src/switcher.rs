use crate::{
    backend::Backend,
    config::Config,
    ipc::Command,
    registry::{Direction, WindowRegistry},
};
use log::{debug, error, info};

/// The on-screen panel the switcher draws into.
pub trait Overlay {
    fn exists(&self) -> bool;
    fn create(&mut self) -> anyhow::Result<()>;
    fn destroy(&mut self);
    /// Unmaps the panel but keeps the surface around for the next show.
    fn detach(&mut self);
    fn reset_input(&mut self);
    fn calculate_dimensions(&self, registry: &WindowRegistry) -> (u32, u32);
    /// Resizes the panel, grabs the keyboard and commits; drawing follows the
    /// compositor's configure.
    fn present(&mut self, width: u32, height: u32);
    fn render(&mut self, registry: &WindowRegistry);
}

pub struct Context<'a> {
    pub registry: &'a mut WindowRegistry,
    pub backend: &'a mut dyn Backend,
    pub overlay: &'a mut dyn Overlay,
    pub config: &'a Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Default)]
pub struct Switcher {
    visible: bool,
}

impl Switcher {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn handle_command(&mut self, command: Command, cx: &mut Context<'_>) -> Flow {
        match command {
            Command::Quit => return Flow::Quit,
            Command::Hide => self.hide(cx),
            Command::Toggle => {
                if self.visible {
                    self.hide(cx);
                } else {
                    self.show(cx);
                }
            }
            // Navigation first brings the switcher up; it only moves once visible.
            Command::Next | Command::Prev | Command::Select if !self.visible => self.show(cx),
            Command::Next => self.advance(Direction::Next, cx),
            Command::Prev => self.advance(Direction::Prev, cx),
            Command::Select => self.select_and_hide(cx),
        }
        Flow::Continue
    }

    pub fn show(&mut self, cx: &mut Context<'_>) {
        if self.visible {
            return;
        }
        debug!("Showing switcher");

        if !cx.overlay.exists()
            && let Err(e) = cx.overlay.create()
        {
            error!("Failed to create overlay: {e:#}");
            return;
        }

        cx.overlay.reset_input();

        cx.registry.clear();
        if let Err(e) = cx.backend.enumerate_windows(cx.registry, cx.config) {
            error!("Failed to update window list: {e}");
            cx.registry.clear();
            return;
        }
        cx.registry.select_initial();
        for window in cx.registry.iter() {
            debug!(
                "  {} [{}] workspace {}{}{}",
                window.title,
                window.class_name,
                window.workspace_id,
                if window.is_floating { " floating" } else { "" },
                if window.is_active { " active" } else { "" },
            );
        }

        let (width, height) = cx.overlay.calculate_dimensions(cx.registry);
        cx.registry.width = width;
        cx.registry.height = height;
        cx.overlay.present(width, height);

        self.visible = true;
    }

    pub fn hide(&mut self, cx: &mut Context<'_>) {
        if !self.visible {
            return;
        }
        self.visible = false;

        if cx.config.follow_monitor {
            cx.overlay.destroy();
        } else {
            cx.overlay.detach();
        }
        debug!("Switcher hidden");
    }

    /// Marks the switcher hidden after the compositor took the overlay away.
    pub fn overlay_lost(&mut self) {
        self.visible = false;
    }

    pub fn select_and_hide(&mut self, cx: &mut Context<'_>) {
        if self.visible
            && let Some(window) = cx.registry.selected()
        {
            info!(
                "Switching to: {} (using {} backend)",
                window.title,
                cx.backend.name()
            );
            cx.backend.activate_window(&window.address);
        }
        self.hide(cx);
    }

    /// Rebuilds the visible list after the backend reported changes.
    pub fn refresh(&mut self, cx: &mut Context<'_>) {
        if !self.visible {
            return;
        }

        let selected = cx.registry.selected().map(|w| w.address.clone());
        cx.registry.clear();
        if let Err(e) = cx.backend.enumerate_windows(cx.registry, cx.config) {
            error!("Failed to refresh window list: {e}");
            self.hide(cx);
            return;
        }
        match selected {
            Some(address) => cx.registry.select_by_address(&address),
            None => cx.registry.select_initial(),
        }

        let (width, height) = cx.overlay.calculate_dimensions(cx.registry);
        if (width, height) != (cx.registry.width, cx.registry.height) {
            cx.registry.width = width;
            cx.registry.height = height;
            cx.overlay.present(width, height);
        } else {
            cx.overlay.render(cx.registry);
        }
    }

    /// Picks up window changes the backend saw since the last iteration. A
    /// change seen while hidden is dropped; the next show enumerates anyway.
    pub fn refresh_if_stale(&mut self, cx: &mut Context<'_>) {
        if cx.backend.take_needs_refresh() && self.visible {
            debug!("Window list changed, refreshing switcher");
            self.refresh(cx);
        }
    }

    fn advance(&mut self, direction: Direction, cx: &mut Context<'_>) {
        if cx.registry.is_empty() {
            return;
        }
        cx.registry.advance(direction);
        cx.overlay.render(cx.registry);
    }
}
