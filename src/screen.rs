use anyhow::{anyhow, Context, Result};
use log::info;
use screenshots::Screen;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Geometry of one monitor in virtual-desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorInfo {
    pub index: usize,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}

impl MonitorInfo {
    pub fn video_size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for MonitorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}  {}x{}  @({},{})", self.index, self.width, self.height, self.x, self.y)?;
        if self.is_primary {
            write!(f, "  primary")?;
        }
        Ok(())
    }
}

pub fn list_monitors() -> Result<Vec<MonitorInfo>> {
    let screens = catch_unwind(AssertUnwindSafe(Screen::all))
        .map_err(|_| anyhow!("Display backend crashed while enumerating monitors"))?
        .context("Failed to enumerate monitors")?;

    let monitors: Vec<MonitorInfo> = screens
        .iter()
        .enumerate()
        .map(|(index, screen)| {
            let info = &screen.display_info;
            MonitorInfo {
                index,
                x: info.x,
                y: info.y,
                width: info.width,
                height: info.height,
                is_primary: info.is_primary,
            }
        })
        .collect();

    info!("Detected {} monitor(s)", monitors.len());
    Ok(monitors)
}

/// Picks the saved monitor when it still exists, else the first one.
pub fn select_index(monitors: &[MonitorInfo], saved: usize) -> Option<usize> {
    if monitors.is_empty() {
        None
    } else if saved < monitors.len() {
        Some(saved)
    } else {
        Some(0)
    }
}
