use super::{Backend, BackendError};
use crate::{
    config::{Config, GroupBy},
    registry::{WindowInfo, WindowRegistry},
};
use hyprland::{
    data::{Client, Clients},
    dispatch::{Dispatch, DispatchType, WindowIdentifier},
    prelude::*,
    shared::Address,
};
use itertools::Itertools;
use std::collections::HashMap;

pub fn is_available() -> bool {
    const IPC_ENV_VAR: &str = "HYPRLAND_INSTANCE_SIGNATURE";
    std::env::var_os(IPC_ENV_VAR).is_some()
}

pub struct HyprlandBackend;

impl Backend for HyprlandBackend {
    fn name(&self) -> &'static str {
        "hyprland"
    }

    fn enumerate_windows(
        &mut self,
        registry: &mut WindowRegistry,
        config: &Config,
    ) -> Result<(), BackendError> {
        let windows = Clients::get()?
            .into_iter()
            .filter(|c| c.mapped)
            .sorted_by_key(|c| c.focus_history_id)
            .map(window_info)
            .collect::<Vec<_>>();

        for window in group_windows(windows, config.group_by) {
            registry.append(window)?;
        }

        Ok(())
    }

    fn activate_window(&mut self, identifier: &str) {
        let address = Address::new(identifier);
        if let Err(e) = Dispatch::call(DispatchType::FocusWindow(WindowIdentifier::Address(
            address,
        ))) {
            log::warn!("Failed to focus window {identifier}: {e}");
        }
    }
}

fn window_info(client: Client) -> WindowInfo {
    WindowInfo {
        address: client.address.to_string(),
        title: client.title,
        class_name: client.class,
        workspace_id: client.workspace.id,
        is_active: client.focus_history_id == 0,
        is_floating: client.floating,
        group_count: 1,
    }
}

fn group_key(window: &WindowInfo, group_by: GroupBy) -> Option<(i32, &str)> {
    match group_by {
        GroupBy::None => None,
        GroupBy::Class => Some((0, window.class_name.as_str())),
        GroupBy::WorkspaceClass => Some((window.workspace_id, window.class_name.as_str())),
    }
}

/// Collapses windows sharing a group key into their most recent member.
///
/// Input must already be in MRU order; the output keeps the position of each
/// group's first member and counts the collapsed windows in `group_count`.
pub fn group_windows(windows: Vec<WindowInfo>, group_by: GroupBy) -> Vec<WindowInfo> {
    if group_by == GroupBy::None {
        return windows;
    }

    let mut positions: HashMap<(i32, String), usize> = HashMap::new();
    let mut grouped: Vec<WindowInfo> = Vec::with_capacity(windows.len());

    for window in windows {
        let Some((workspace, class)) = group_key(&window, group_by) else {
            grouped.push(window);
            continue;
        };
        let key = (workspace, class.to_string());
        match positions.get(&key) {
            Some(&index) => {
                let head = &mut grouped[index];
                head.group_count += 1;
                head.is_active |= window.is_active;
            }
            None => {
                positions.insert(key, grouped.len());
                grouped.push(window);
            }
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(address: &str, class: &str, workspace_id: i32) -> WindowInfo {
        WindowInfo {
            address: address.to_string(),
            title: address.to_string(),
            class_name: class.to_string(),
            workspace_id,
            ..Default::default()
        }
    }

    fn sample() -> Vec<WindowInfo> {
        vec![
            window("0x1", "firefox", 1),
            window("0x2", "foot", 1),
            window("0x3", "firefox", 1),
            window("0x4", "firefox", 2),
            window("0x5", "foot", 1),
        ]
    }

    #[test]
    fn no_grouping_keeps_every_window() {
        let grouped = group_windows(sample(), GroupBy::None);
        assert_eq!(grouped.len(), 5);
        assert!(grouped.iter().all(|w| w.group_count == 1));
    }

    #[test]
    fn workspace_class_grouping_collapses_siblings() {
        let grouped = group_windows(sample(), GroupBy::WorkspaceClass);
        let summary: Vec<_> = grouped
            .iter()
            .map(|w| (w.address.as_str(), w.group_count))
            .collect();
        assert_eq!(summary, vec![("0x1", 2), ("0x2", 2), ("0x4", 1)]);
    }

    #[test]
    fn class_grouping_ignores_workspace() {
        let grouped = group_windows(sample(), GroupBy::Class);
        let summary: Vec<_> = grouped
            .iter()
            .map(|w| (w.address.as_str(), w.group_count))
            .collect();
        assert_eq!(summary, vec![("0x1", 3), ("0x2", 2)]);
    }

    #[test]
    fn k_siblings_become_one_entry_with_count_k() {
        for k in 1..6 {
            let windows = (0..k)
                .map(|i| window(&format!("0x{i}"), "kitty", 3))
                .collect();
            let grouped = group_windows(windows, GroupBy::WorkspaceClass);

            let mut registry = WindowRegistry::default();
            for w in grouped {
                registry.append(w).unwrap();
            }
            assert_eq!(registry.len(), 1);
            assert_eq!(registry.selected().unwrap().group_count, k);
        }
    }

    #[test]
    fn group_is_active_when_any_member_is() {
        let mut windows = sample();
        windows[2].is_active = true;
        let grouped = group_windows(windows, GroupBy::Class);
        assert!(grouped[0].is_active);
        assert!(!grouped[1].is_active);
    }
}
