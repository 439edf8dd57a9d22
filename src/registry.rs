use thiserror::Error;

const INITIAL_CAPACITY: usize = 32;
const DEFAULT_WIDTH: u32 = 200;
const DEFAULT_HEIGHT: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("out of memory while growing the window list")]
    OutOfMemory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub address: String,
    pub title: String,
    pub class_name: String,
    pub workspace_id: i32,
    pub is_active: bool,
    pub is_floating: bool,
    pub group_count: u32,
}

impl Default for WindowInfo {
    fn default() -> Self {
        Self {
            address: String::new(),
            title: String::new(),
            class_name: String::new(),
            workspace_id: 0,
            is_active: false,
            is_floating: false,
            group_count: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    fn offset(self) -> isize {
        match self {
            Direction::Next => 1,
            Direction::Prev => -1,
        }
    }
}

/// MRU-ordered snapshot of the windows shown by the switcher, plus the
/// current selection and the last known overlay size.
#[derive(Debug, Clone)]
pub struct WindowRegistry {
    windows: Vec<WindowInfo>,
    selected_index: usize,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self {
            windows: Vec::new(),
            selected_index: 0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl WindowRegistry {
    pub fn clear(&mut self) {
        self.windows.clear();
        self.selected_index = 0;
    }

    pub fn append(&mut self, info: WindowInfo) -> Result<(), RegistryError> {
        if self.windows.len() == self.windows.capacity() {
            let additional = self.windows.capacity().max(INITIAL_CAPACITY);
            self.windows
                .try_reserve_exact(additional)
                .map_err(|_| RegistryError::OutOfMemory)?;
        }
        self.windows.push(info);
        Ok(())
    }

    pub fn advance(&mut self, direction: Direction) {
        let len = self.windows.len();
        if len == 0 {
            return;
        }
        let len = len as isize;
        let index = (self.selected_index as isize + direction.offset() + len) % len;
        self.selected_index = index as usize;
    }

    pub fn selected(&self) -> Option<&WindowInfo> {
        self.windows.get(self.selected_index)
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    /// Biases the initial selection to the previously used window.
    pub fn select_initial(&mut self) {
        self.selected_index = if self.windows.len() > 1 { 1 } else { 0 };
    }

    /// Selects the entry with `address`, or clamps the current index if it is gone.
    pub fn select_by_address(&mut self, address: &str) {
        if let Some(index) = self.windows.iter().position(|w| w.address == address) {
            self.selected_index = index;
        } else {
            self.selected_index = self
                .selected_index
                .min(self.windows.len().saturating_sub(1));
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowInfo> {
        self.windows.iter()
    }
}
