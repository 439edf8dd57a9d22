use super::Daemon;
use crate::{
    config::{Appearance, Config},
    input::Keyboard,
    registry::WindowRegistry,
    render::{self, BYTES_PER_PIXEL, Layout},
    switcher::Overlay,
};
use anyhow::Context;
use log::{debug, warn};
use smithay_client_toolkit::{
    compositor::CompositorState,
    shell::{
        WaylandSurface,
        wlr_layer::{Anchor, KeyboardInteractivity, Layer, LayerShell, LayerSurface},
    },
    shm::{Shm, slot::SlotPool},
};
use tiny_skia::PixmapMut;
use wayland_client::{QueueHandle, protocol::wl_shm};

const NAMESPACE: &str = "wswitch";

/// Layer-shell overlay the switcher is drawn on.
///
/// The surface is created unmapped and only gets a buffer after the
/// compositor's configure for the requested size has arrived.
pub struct Panel {
    compositor: CompositorState,
    layer_shell: LayerShell,
    pub(super) shm: Shm,
    pool: SlotPool,
    handle: QueueHandle<Daemon>,
    layer: Option<LayerSurface>,
    configured: bool,
    pub keyboard: Keyboard,
    appearance: Appearance,
    show_group_count: bool,
}

impl Panel {
    pub fn new(
        compositor: CompositorState,
        layer_shell: LayerShell,
        shm: Shm,
        handle: QueueHandle<Daemon>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let (width, height) = Layout::new(&config.appearance, 1).dimensions(1);
        let pool = SlotPool::new((width * height * BYTES_PER_PIXEL) as usize, &shm)
            .context("failed to create shm pool")?;

        Ok(Self {
            compositor,
            layer_shell,
            shm,
            pool,
            handle,
            layer: None,
            configured: false,
            keyboard: Keyboard::default(),
            appearance: config.appearance.clone(),
            show_group_count: config.show_group_count,
        })
    }

    pub fn is_layer(&self, layer: &LayerSurface) -> bool {
        self.layer
            .as_ref()
            .is_some_and(|current| current.wl_surface() == layer.wl_surface())
    }

    pub fn mark_configured(&mut self) {
        self.configured = true;
    }

    fn draw(&mut self, registry: &WindowRegistry) -> anyhow::Result<()> {
        let Some(layer) = &self.layer else {
            return Ok(());
        };

        let (width, height) = (registry.width, registry.height);
        let stride = width
            .checked_mul(BYTES_PER_PIXEL)
            .context("surface too wide")?;
        let size = (stride as usize)
            .checked_mul(height as usize)
            .context("surface too large")?;
        if self.pool.len() < size {
            self.pool.resize(size).context("failed to grow shm pool")?;
        }

        let (buffer, canvas) = self
            .pool
            .create_buffer(
                i32::try_from(width)?,
                i32::try_from(height)?,
                i32::try_from(stride)?,
                wl_shm::Format::Argb8888,
            )
            .context("failed to create buffer")?;
        {
            let mut pixmap = PixmapMut::from_bytes(&mut *canvas, width, height)
                .context("empty or mismatched buffer")?;
            render::paint(&mut pixmap, registry, &self.appearance, self.show_group_count);
        }
        render::to_argb8888(canvas);

        let surface = layer.wl_surface();
        surface.damage_buffer(0, 0, i32::try_from(width)?, i32::try_from(height)?);
        buffer
            .attach_to(surface)
            .context("failed to attach buffer")?;
        layer.commit();

        Ok(())
    }
}

impl Overlay for Panel {
    fn exists(&self) -> bool {
        self.layer.is_some()
    }

    fn create(&mut self) -> anyhow::Result<()> {
        let surface = self.compositor.create_surface(&self.handle);
        let layer = self.layer_shell.create_layer_surface(
            &self.handle,
            surface,
            Layer::Overlay,
            Some(NAMESPACE),
            None,
        );
        layer.set_size(1, 1);
        layer.set_anchor(Anchor::empty());
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);

        self.layer = Some(layer);
        self.configured = false;
        debug!("Panel created");

        Ok(())
    }

    fn destroy(&mut self) {
        // Dropping the layer surface destroys it together with its wl_surface.
        if self.layer.take().is_some() {
            debug!("Panel destroyed");
        }
        self.configured = false;
    }

    fn detach(&mut self) {
        if let Some(layer) = &self.layer {
            layer.set_keyboard_interactivity(KeyboardInteractivity::None);
            layer.wl_surface().attach(None, 0, 0);
            layer.commit();
            debug!("Panel hidden (not destroyed)");
        }
        // Unmapped layer surfaces need a fresh configure before the next buffer.
        self.configured = false;
    }

    fn reset_input(&mut self) {
        self.keyboard.reset();
    }

    fn calculate_dimensions(&self, registry: &WindowRegistry) -> (u32, u32) {
        Layout::new(&self.appearance, registry.len()).dimensions(registry.len())
    }

    fn present(&mut self, width: u32, height: u32) {
        if let Some(layer) = &self.layer {
            layer.set_size(width, height);
            layer.set_keyboard_interactivity(KeyboardInteractivity::Exclusive);
            layer.commit();
        }
    }

    fn render(&mut self, registry: &WindowRegistry) {
        if !self.configured {
            return;
        }
        if let Err(e) = self.draw(registry) {
            warn!("Failed to render switcher: {e:#}");
        }
    }
}
